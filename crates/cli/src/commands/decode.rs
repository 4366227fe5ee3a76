//! Module for the `decode` subcommand, which parses an assembly file and prints the normalized
//! listing of every method, or the instructions as JSON.

use async_trait::async_trait;
use clap::Args;
use ilweave_core::decoder::disassemble;
use serde::Serialize;
use std::error::Error;

/// Arguments for the `decode` subcommand.
#[derive(Args)]
pub struct DecodeArgs {
    /// Assembly file containing one or more `.method` blocks.
    pub input: String,
    /// Print instructions as JSON instead of a listing.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct DecodedMethod<'a> {
    method: String,
    signature: &'a ilweave_core::Signature,
    instructions: Vec<&'a ilweave_core::Instruction>,
}

/// Executes the `decode` subcommand.
#[async_trait]
impl super::Command for DecodeArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let methods = super::read_module(&self.input).await?;

        if self.json {
            let decoded: Vec<_> = methods
                .iter()
                .map(|stream| DecodedMethod {
                    method: stream.method().to_string(),
                    signature: stream.signature(),
                    instructions: stream.instructions().collect(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&decoded)?);
        } else {
            for stream in &methods {
                println!("{}", disassemble(stream));
            }
        }
        Ok(())
    }
}
