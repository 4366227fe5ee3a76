//! Module for the `encode` subcommand, which prints the canonical byte encoding of each method
//! along with its SHA3-256 digest.

use async_trait::async_trait;
use clap::Args;
use ilweave_core::encoder::{digest_hex, encode};
use std::error::Error;

/// Arguments for the `encode` subcommand.
#[derive(Args)]
pub struct EncodeArgs {
    /// Assembly file containing one or more `.method` blocks.
    pub input: String,
    /// Only print digests.
    #[arg(long)]
    digest_only: bool,
}

#[async_trait]
impl super::Command for EncodeArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        for stream in super::read_module(&self.input).await? {
            ilweave_core::validator::verify(&stream)?;
            let digest = digest_hex(&stream)?;
            if self.digest_only {
                println!("{} {}", stream.method(), digest);
            } else {
                let bytes = encode(&stream)?;
                println!("{} ({} bytes, digest {})", stream.method(), bytes.len(), digest);
                println!("0x{}", hex::encode(&bytes));
            }
        }
        Ok(())
    }
}
