pub mod error;
pub mod go_ast;
pub mod gosrc;
pub mod naming;
pub mod patch;
pub mod plugin;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod rewrite;
pub mod synth;
