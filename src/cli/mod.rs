pub mod args;

pub use args::{Arguments, VariantCaller};
use clap::Parser;

pub fn parse() -> Arguments {
    Arguments::parse()
}
