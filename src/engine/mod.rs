pub mod coordinator;
pub mod machine;
