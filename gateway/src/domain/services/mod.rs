pub mod bip21;
pub mod descriptor;
pub mod token_codec;
