//! End to end patching tests.
//!
//! Every scenario goes through the same path a runtime would: patches are registered first, the
//! registry is subscribed to the host's load events, and defining a method applies its patch
//! before anyone invokes it.

mod cli;
mod reward_rate;

use color_eyre::Result;
use ilweave_core::{MethodTable, load_module};
use ilweave_patch::PatchRegistry;
use std::sync::Arc;

pub const TRANSITION_ASM: &str = include_str!("../../../demos/transition.asm");

pub const REWARD_PLAN: &str = include_str!("../../../demos/reward_rate.json");

/// `cond && (n % 5 == 0)` with the 5 as a single immediate load.
pub const MULTIPLE_OF_FIVE: &str = "
.method Level::reward(bool, i32) -> bool
    ldarg 0
    brfalse @skip
    ldarg 1
    ldc.i4 5
    rem
    ldc.i4 0
    ceq
    ret
@skip:
    ldc.bool false
    ret
";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .try_init();
}

/// Builds a host with `registry` subscribed, then loads `src` into it.
pub fn host_with(registry: &Arc<PatchRegistry>, src: &str) -> Result<MethodTable> {
    let table = MethodTable::new();
    table.subscribe(registry.clone());
    load_module(&table, src)?;
    Ok(table)
}
