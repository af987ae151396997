pub mod box_retriever;
pub mod retriever;
