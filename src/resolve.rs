use std::collections::HashSet;
use std::path::{Path, PathBuf};

use prost_types::compiler::CodeGeneratorRequest;
use prost_types::{FileDescriptorProto, FileDescriptorSet};

const PROTO_EXTENSION: &str = ".proto";
const GATEWAY_SUFFIX: &str = ".pb.gw.go";

/// One RPC method of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
}

/// One RPC service and its methods, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}

/// A proto file with at least one service: the unit of work for a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub filename: String,
    pub services: Vec<ServiceDescriptor>,
}

impl ServiceDescriptor {
    pub fn new<I, S>(name: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            methods: methods
                .into_iter()
                .map(|m| MethodDescriptor { name: m.into() })
                .collect(),
        }
    }
}

impl FileDescriptor {
    pub fn new(filename: impl Into<String>, services: Vec<ServiceDescriptor>) -> Self {
        Self {
            filename: filename.into(),
            services,
        }
    }

    /// Location of the grpc-gateway output for this proto file.
    ///
    /// `api/v1/greeter.proto` under `gen` resolves to
    /// `gen/api/v1/greeter.pb.gw.go`: only the `.proto` suffix is dropped,
    /// the directory part is kept.
    pub fn gateway_path(&self, out_dir: &Path) -> PathBuf {
        let stem = self
            .filename
            .strip_suffix(PROTO_EXTENSION)
            .unwrap_or(&self.filename);
        out_dir.join(format!("{stem}{GATEWAY_SUFFIX}"))
    }

    pub fn method_count(&self) -> usize {
        self.services.iter().map(|s| s.methods.len()).sum()
    }
}

impl From<&FileDescriptorProto> for FileDescriptor {
    fn from(proto: &FileDescriptorProto) -> Self {
        let services = proto
            .service
            .iter()
            .map(|svc| ServiceDescriptor {
                name: svc.name().to_string(),
                methods: svc
                    .method
                    .iter()
                    .map(|m| MethodDescriptor {
                        name: m.name().to_string(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            filename: proto.name().to_string(),
            services,
        }
    }
}

/// Files protoc asked us to generate for that declare at least one service,
/// in the order they appear in the request.
pub fn resolve_request_files(req: &CodeGeneratorRequest) -> Vec<FileDescriptor> {
    let wanted: HashSet<&str> = req.file_to_generate.iter().map(String::as_str).collect();
    select_service_files(&req.proto_file, |name| wanted.contains(name))
}

/// Files of a descriptor set that declare at least one service. An empty
/// `only` keeps every such file; otherwise a file is kept when its name is
/// listed.
pub fn resolve_descriptor_set_files(set: &FileDescriptorSet, only: &[String]) -> Vec<FileDescriptor> {
    let wanted: HashSet<&str> = only.iter().map(String::as_str).collect();
    select_service_files(&set.file, |name| wanted.is_empty() || wanted.contains(name))
}

fn select_service_files(
    protos: &[FileDescriptorProto],
    keep: impl Fn(&str) -> bool,
) -> Vec<FileDescriptor> {
    protos
        .iter()
        .filter(|file| !file.service.is_empty() && keep(file.name()))
        .map(FileDescriptor::from)
        .collect()
}
