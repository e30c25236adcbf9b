pub mod resequencing;
