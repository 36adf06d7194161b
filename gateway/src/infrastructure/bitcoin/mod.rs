pub mod error;
pub mod esplora;
pub mod retry;
pub mod rpc;
pub mod source;

pub use error::NodeError;
pub use esplora::EsploraSource;
pub use retry::RetryHandler;
pub use rpc::RpcSource;
pub use source::{build_source, AddressOutput, ChainSource, ChainTx, ChainTxOut, FallbackSource};
