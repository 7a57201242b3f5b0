//! Host tool availability checks.
//!
//! `strata preflight` answers one question before any layer build is
//! attempted: can this host pack and extract squashfs right now?

use std::path::PathBuf;

use crate::tool::Tool;

/// Where (or whether) one external tool was found.
pub struct ToolStatus {
    pub tool: Tool,
    pub path: Option<PathBuf>,
}

/// Availability of every tool the builder can shell out to.
pub struct ToolReport {
    pub tools: Vec<ToolStatus>,
}

impl ToolReport {
    /// Required tools that are absent from PATH.
    pub fn missing_required(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .filter(|status| status.path.is_none() && status.tool.required())
            .map(|status| status.tool)
            .collect()
    }

    /// Print one line per tool, then the verdict.
    pub fn print(&self) {
        println!("External tools:");
        for status in &self.tools {
            match &status.path {
                Some(path) => {
                    println!("  {:<12} {}", status.tool.name(), path.display());
                }
                None if status.tool.required() => {
                    println!(
                        "  {:<12} missing - {}",
                        status.tool.name(),
                        status.tool.install_hint()
                    );
                }
                None => {
                    println!(
                        "  {:<12} missing (optional) - {}",
                        status.tool.name(),
                        status.tool.install_hint()
                    );
                }
            }
        }

        let missing = self.missing_required();
        if missing.is_empty() {
            println!("\nThis host can build squashfs layers.");
        } else {
            let names: Vec<&str> = missing.iter().map(|t| t.name()).collect();
            println!("\nCannot build layers until installed: {}", names.join(", "));
        }
    }
}

/// Check every external tool against the current PATH.
pub fn check_tools() -> ToolReport {
    ToolReport {
        tools: Tool::ALL
            .iter()
            .map(|&tool| ToolStatus {
                tool,
                path: tool.locate(),
            })
            .collect(),
    }
}
