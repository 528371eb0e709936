//! Inspect command implementation.
//!
//! Loads a module library through a throwaway host, prints which hooks it
//! exports, and unloads it again.

use std::path::Path;

use framehost_core::{Capability, HostContext, Job, JobOutcome};

use crate::colors;

pub fn execute(path: &Path) -> anyhow::Result<()> {
    let host = HostContext::builder().build();

    let (name, capabilities) = match Job::Load(path.to_path_buf()).execute(&host)? {
        JobOutcome::Loaded { name, capabilities } => (name, capabilities),
        other => anyhow::bail!("unexpected outcome loading {}: {:?}", path.display(), other),
    };

    println!("{}{}{}", colors::BOLD, name, colors::RESET);
    for capability in [Capability::Tick, Capability::Present, Capability::Keyboard] {
        let (mark, color) = if capabilities.has(capability) {
            ("yes", colors::GREEN)
        } else {
            ("no", colors::DIM)
        };
        println!("  {:<10}{}{}{}", capability.as_str(), color, mark, colors::RESET);
    }
    if capabilities.is_empty() {
        println!(
            "{}Module exports no hooks and would never be called.{}",
            colors::YELLOW,
            colors::RESET
        );
    }

    host.detach();
    Ok(())
}
