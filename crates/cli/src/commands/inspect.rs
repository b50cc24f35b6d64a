use std::path::Path;

use anyhow::Result;
use hundun_core::model::{verify_module, CoverageId, FunctionKind, Module, Op};
use serde::Serialize;

use crate::load_module;

#[derive(Debug, Serialize)]
pub struct FunctionSummary {
    pub name: String,
    pub kind: FunctionKind,
    pub blocks: usize,
    pub coverage_ids: Vec<CoverageId>,
    pub trap_blocks: usize,
}

#[derive(Debug, Serialize)]
pub struct ModuleSummary {
    pub path: String,
    pub functions: Vec<FunctionSummary>,
    /// `None` when the module passes the structural check.
    pub verify_error: Option<String>,
}

pub fn summarize_module(module: &Module) -> ModuleSummary {
    let functions = module
        .functions
        .iter()
        .map(|f| FunctionSummary {
            name: f.name.clone(),
            kind: f.kind,
            blocks: f.blocks.len(),
            coverage_ids: f.blocks.iter().flat_map(|b| b.coverage_marks()).collect(),
            trap_blocks: f.blocks.iter().filter(|b| b.ops.contains(&Op::Trap)).count(),
        })
        .collect();
    ModuleSummary {
        path: module.path.clone(),
        functions,
        verify_error: verify_module(module).err().map(|e| e.to_string()),
    }
}

/// Show what a module file (JSON or snapshot) contains.
pub fn inspect_command(path: &Path, json: bool) -> Result<ModuleSummary> {
    let module = load_module(path)?;
    let summary = summarize_module(&module);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(summary);
    }

    println!("Module: {}", summary.path);
    match &summary.verify_error {
        Some(err) => println!("Structure: INVALID ({err})"),
        None => println!("Structure: OK"),
    }
    if summary.functions.is_empty() {
        println!("Functions: (none)");
    }
    for f in &summary.functions {
        println!("- {} [{:?}] blocks={} traps={}", f.name, f.kind, f.blocks, f.trap_blocks);
        if !f.coverage_ids.is_empty() {
            let ids: Vec<String> = f.coverage_ids.iter().map(|id| id.to_string()).collect();
            println!("    coverage ids: {}", ids.join(", "));
        }
    }
    Ok(summary)
}
