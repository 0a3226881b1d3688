pub mod pension;
