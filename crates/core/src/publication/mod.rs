pub mod domain;
pub mod infrastructure;
pub mod publication_adapter;
