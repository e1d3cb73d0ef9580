use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use prost_types::compiler::code_generator_response::Feature;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::registry::Registry;
use crate::report::{FileReport, RunReport, SkippedFile};
use crate::resolve::{FileDescriptor, resolve_request_files};
use crate::rewrite::rewrite_gateway_source;

pub const DEFAULT_OUT_DIR: &str = ".";

const KEEP_GOING: &str = "keep_going";

/// Settings for one run, from the protoc parameter string or the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Directory holding the grpc-gateway output.
    pub out_dir: PathBuf,
    /// Log failures and continue with the next file instead of aborting.
    pub keep_going: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            keep_going: false,
        }
    }
}

/// Parse the comma-separated `key=value` parameter string protoc passes
/// through from `--gateway-interceptor_out=<params>:<dir>`.
///
/// A string with a single pair whose key is not recognised is read as the
/// output directory, so `gen` and `path=gen` both work.
pub fn parse_parameter(param: Option<&str>) -> Options {
    let mut opts = Options::default();
    let Some(param) = param else {
        return opts;
    };

    let pairs: Vec<(&str, &str)> = param
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None if p == KEEP_GOING => (p, "true"),
            None => ("", p),
        })
        .collect();

    let single = pairs.len() == 1;
    for (key, value) in pairs {
        match key {
            "out_dir" | "outdir" | "out" => opts.out_dir = out_dir(value),
            KEEP_GOING => opts.keep_going = parse_flag(key, value),
            _ if single => opts.out_dir = out_dir(value),
            _ => warn!(key, value, "ignoring unknown plugin parameter"),
        }
    }
    opts
}

fn out_dir(value: &str) -> PathBuf {
    if value.is_empty() {
        PathBuf::from(DEFAULT_OUT_DIR)
    } else {
        PathBuf::from(value)
    }
}

fn parse_flag(key: &str, value: &str) -> bool {
    match value {
        "" | "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => {
            warn!(key, value, "expected true or false; treating as false");
            false
        }
    }
}

pub fn read_request(mut input: impl Read) -> Result<CodeGeneratorRequest, Error> {
    let mut buf = Vec::new();
    input.read_to_end(&mut buf).map_err(Error::ReadRequest)?;
    CodeGeneratorRequest::decode(buf.as_slice()).map_err(|source| Error::DecodeRequest {
        what: "code generator request",
        source,
    })
}

/// Load a `FileDescriptorSet` as written by `protoc --descriptor_set_out`.
pub fn read_descriptor_set(path: &Path) -> Result<FileDescriptorSet, Error> {
    let bytes = fs::read(path).map_err(|source| Error::ReadDescriptorSet {
        path: path.to_path_buf(),
        source,
    })?;
    FileDescriptorSet::decode(bytes.as_slice()).map_err(|source| Error::DecodeRequest {
        what: "descriptor set",
        source,
    })
}

/// The response protoc expects on stdout. Rewrites happen in place, so it
/// never lists files; on failure it carries the error message.
pub fn encode_response(error: Option<String>) -> Vec<u8> {
    CodeGeneratorResponse {
        error,
        supported_features: Some(Feature::Proto3Optional as u64),
        ..Default::default()
    }
    .encode_to_vec()
}

/// Requested proto files that will not be processed, and why.
pub fn unresolved_files(
    requested: &[String],
    resolved: &[FileDescriptor],
    protos: &[FileDescriptorProto],
) -> Vec<SkippedFile> {
    requested
        .iter()
        .filter(|name| !resolved.iter().any(|f| &f.filename == *name))
        .map(|name| {
            let reason = if protos.iter().any(|p| p.name() == name.as_str()) {
                "no services"
            } else {
                "no descriptor"
            };
            warn!(file = %name, reason, "skipping proto file");
            SkippedFile {
                proto_file: name.clone(),
                reason: reason.to_string(),
            }
        })
        .collect()
}

/// Plugin mode: decode the request, rewrite every gateway file it names and
/// write the response to `output`, whatever the outcome.
pub fn serve(input: impl Read, mut output: impl Write) -> Result<RunReport, Error> {
    let outcome = run_request(input);
    let message = outcome.as_ref().err().map(ToString::to_string);
    output.write_all(&encode_response(message))?;
    output.flush()?;
    outcome
}

fn run_request(input: impl Read) -> Result<RunReport, Error> {
    let request = read_request(input)?;
    let opts = parse_parameter(request.parameter.as_deref());
    debug!(out_dir = %opts.out_dir.display(), keep_going = opts.keep_going, "plugin options");

    let files = resolve_request_files(&request);
    let skipped = unresolved_files(&request.file_to_generate, &files, &request.proto_file);

    let mut report = process_files(&files, &opts, None)?;
    report.skipped = skipped.into_iter().chain(report.skipped).collect();
    check_complete(&report, files.len())?;
    Ok(report)
}

/// Fail when any file of a keep-going run was left unrewritten.
pub fn check_complete(report: &RunReport, total: usize) -> Result<(), Error> {
    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(Error::Incomplete {
            failed: report.failed.len(),
            total,
        })
    }
}

/// Rewrite the gateway output of each file under `opts.out_dir`.
///
/// With `dry_run` set, rewritten sources go to that writer and nothing on
/// disk changes. Without `keep_going` the first failure is returned; files
/// already done keep their rewrite.
pub fn process_files(
    files: &[FileDescriptor],
    opts: &Options,
    mut dry_run: Option<&mut dyn Write>,
) -> Result<RunReport, Error> {
    let mut report = RunReport::default();
    for file in files {
        match process_file(file, opts, dry_run.as_deref_mut()) {
            Ok(file_report) => report.files.push(file_report),
            Err(Error::NoServices { file: name }) => {
                warn!(file = %name, "no services; skipping");
                report.skipped.push(SkippedFile {
                    proto_file: name,
                    reason: "no services".to_string(),
                });
            }
            Err(e) if opts.keep_going => {
                error!(file = %file.filename, "{e}");
                report.failed.push(SkippedFile {
                    proto_file: file.filename.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        files = report.files.len(),
        changed = report.changed_files(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "rewrite finished"
    );
    Ok(report)
}

fn process_file(
    file: &FileDescriptor,
    opts: &Options,
    dry_run: Option<&mut (dyn Write + '_)>,
) -> Result<FileReport, Error> {
    let registry = Registry::build(file)?;
    let path = file.gateway_path(&opts.out_dir);
    debug!(
        file = %file.filename,
        gateway = %path.display(),
        roots = registry.root_count(),
        calls = registry.expected_call_count(),
        "rewriting"
    );

    let source = fs::read_to_string(&path).map_err(|source| Error::ReadError {
        path: path.clone(),
        source,
    })?;
    let result = rewrite_gateway_source(&source, &registry).map_err(|source| Error::ParseError {
        path: path.clone(),
        source,
    })?;

    match dry_run {
        Some(out) => {
            writeln!(out, "// {}", path.display())?;
            out.write_all(result.source.as_bytes())?;
        }
        None if result.summary.changed => write_atomic(&path, &result.source)?,
        None => {}
    }

    let s = &result.summary;
    info!(
        gateway = %path.display(),
        roots_patched = s.roots_patched.len(),
        call_sites = s.call_sites_rewritten.len(),
        stale_removed = s.stale_wrappers_removed.len(),
        wrappers = s.wrappers.len(),
        changed = s.changed,
        "rewrote gateway file"
    );

    Ok(FileReport {
        proto_file: file.filename.clone(),
        gateway_path: path,
        summary: result.summary,
    })
}

/// Replace `path` through a sibling temp file so a failed write never
/// leaves it half written. A symlinked path has its target replaced, and the
/// target keeps its permissions.
fn write_atomic(path: &Path, contents: &str) -> Result<(), Error> {
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{file_name}.tmp"));
    let permissions = fs::metadata(&target).ok().map(|m| m.permissions());
    let written = fs::write(&tmp, contents)
        .and_then(|()| match permissions {
            Some(perm) => fs::set_permissions(&tmp, perm),
            None => Ok(()),
        })
        .and_then(|()| fs::rename(&tmp, &target));
    written.map_err(|source| {
        let _ = fs::remove_file(&tmp);
        Error::WriteError {
            path: path.to_path_buf(),
            source,
        }
    })
}
