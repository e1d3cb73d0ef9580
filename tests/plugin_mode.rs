//! End-to-end tests: feed the binary a CodeGeneratorRequest on stdin, as
//! protoc does, and check the gateway files it rewrites in place.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use prost::Message;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use prost_types::{FileDescriptorProto, MethodDescriptorProto, ServiceDescriptorProto};

const GREETER: &str = include_str!("fixtures/greeter.pb.gw.go");

fn proto_file(name: &str, service: Option<(&str, &[&str])>) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some("greeter".to_string()),
        service: service
            .into_iter()
            .map(|(svc, methods)| ServiceDescriptorProto {
                name: Some(svc.to_string()),
                method: methods
                    .iter()
                    .map(|m| MethodDescriptorProto {
                        name: Some(m.to_string()),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn greeter_proto(name: &str) -> FileDescriptorProto {
    proto_file(name, Some(("Greeter", &["SayHello", "SayBye"])))
}

fn request(files: Vec<FileDescriptorProto>, parameter: &str) -> CodeGeneratorRequest {
    CodeGeneratorRequest {
        file_to_generate: files.iter().map(|f| f.name().to_string()).collect(),
        parameter: Some(parameter.to_string()),
        proto_file: files,
        ..Default::default()
    }
}

/// Run the plugin with `req` on stdin; returns the process output and the
/// decoded response.
fn run_plugin(req: &CodeGeneratorRequest) -> (Output, CodeGeneratorResponse) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_protoc-gen-gateway-interceptor"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn plugin");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(&req.encode_to_vec())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let response = CodeGeneratorResponse::decode(output.stdout.as_slice())
        .expect("stdout should hold a CodeGeneratorResponse");
    (output, response)
}

fn write_gateway(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn plugin_rewrites_gateway_file_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    write_gateway(tmp.path(), "api/greeter.pb.gw.go", GREETER);

    let req = request(
        vec![greeter_proto("api/greeter.proto")],
        &format!("out_dir={}", tmp.path().display()),
    );
    let (output, response) = run_plugin(&req);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "plugin failed:\n{stderr}");
    assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
    assert!(response.file.is_empty());

    let rewritten = fs::read_to_string(tmp.path().join("api/greeter.pb.gw.go")).unwrap();
    assert!(
        rewritten.contains("server GreeterServer, interceptor *grpc.UnaryServerInterceptor) error {"),
        "Got:\n{rewritten}"
    );
    assert_eq!(rewritten.matches("\nfunc interceptor_").count(), 2);
    assert!(rewritten.contains("FullMethod: \"/greeter.Greeter/SayHello\"}"));
    assert!(rewritten.contains("FullMethod: \"/greeter.Greeter/SayBye\"}"));
}

#[test]
fn second_plugin_run_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    write_gateway(tmp.path(), "greeter.pb.gw.go", GREETER);
    let req = request(vec![greeter_proto("greeter.proto")], &tmp.path().display().to_string());

    let (first, _) = run_plugin(&req);
    assert!(first.status.success());
    let once = fs::read_to_string(tmp.path().join("greeter.pb.gw.go")).unwrap();

    let (second, _) = run_plugin(&req);
    assert!(second.status.success());
    let twice = fs::read_to_string(tmp.path().join("greeter.pb.gw.go")).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn files_are_rewritten_against_their_own_services() {
    let tmp = tempfile::tempdir().unwrap();
    write_gateway(tmp.path(), "greeter.pb.gw.go", GREETER);
    // Same content, but this proto declares a different service.
    write_gateway(tmp.path(), "other.pb.gw.go", GREETER);

    let req = request(
        vec![
            greeter_proto("greeter.proto"),
            proto_file("other.proto", Some(("Farewell", &["SayBye"]))),
        ],
        &format!("out_dir={}", tmp.path().display()),
    );
    let (output, _) = run_plugin(&req);
    assert!(output.status.success());

    let greeter = fs::read_to_string(tmp.path().join("greeter.pb.gw.go")).unwrap();
    assert!(greeter.contains("func interceptor_local_request_Greeter_SayHello_0("));
    let other = fs::read_to_string(tmp.path().join("other.pb.gw.go")).unwrap();
    assert_eq!(other, GREETER);
}

#[test]
fn files_without_services_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let req = request(
        vec![proto_file("types.proto", None)],
        &format!("out_dir={}", tmp.path().display()),
    );
    let (output, response) = run_plugin(&req);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "plugin failed:\n{stderr}");
    assert!(response.error.is_none());
    assert!(stderr.contains("types.proto"), "stderr:\n{stderr}");
}

#[test]
fn parse_failure_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    write_gateway(tmp.path(), "a.pb.gw.go", "package gw\n\nfunc (\n");
    write_gateway(tmp.path(), "b.pb.gw.go", GREETER);

    let req = request(
        vec![greeter_proto("a.proto"), greeter_proto("b.proto")],
        &format!("out_dir={}", tmp.path().display()),
    );
    let (output, response) = run_plugin(&req);

    assert_eq!(output.status.code(), Some(1));
    let error = response.error.expect("response should carry the error");
    assert!(error.contains("a.pb.gw.go"), "error: {error}");
    assert_eq!(
        fs::read_to_string(tmp.path().join("a.pb.gw.go")).unwrap(),
        "package gw\n\nfunc (\n"
    );
    assert_eq!(fs::read_to_string(tmp.path().join("b.pb.gw.go")).unwrap(), GREETER);
}

#[test]
fn keep_going_rewrites_the_rest() {
    let tmp = tempfile::tempdir().unwrap();
    write_gateway(tmp.path(), "a.pb.gw.go", "package gw\n\nfunc (\n");
    write_gateway(tmp.path(), "b.pb.gw.go", GREETER);

    let req = request(
        vec![greeter_proto("a.proto"), greeter_proto("b.proto")],
        &format!("out_dir={},keep_going=true", tmp.path().display()),
    );
    let (output, response) = run_plugin(&req);

    assert_eq!(output.status.code(), Some(1));
    let error = response.error.expect("response should carry the error");
    assert!(error.contains("1 of 2"), "error: {error}");
    let b = fs::read_to_string(tmp.path().join("b.pb.gw.go")).unwrap();
    assert!(b.contains("func interceptor_local_request_Greeter_SayBye_0("));
}

#[test]
fn garbage_on_stdin_is_reported() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_protoc-gen-gateway-interceptor"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(&[0xff, 0xff, 0xff]).unwrap();
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let response = CodeGeneratorResponse::decode(output.stdout.as_slice()).unwrap();
    assert!(response.error().contains("failed to decode"), "{:?}", response.error);
}
