use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gateway_interceptor::error::Error;
use gateway_interceptor::plugin::{
    DEFAULT_OUT_DIR, Options, check_complete, process_files, read_descriptor_set, serve,
    unresolved_files,
};
use gateway_interceptor::report::format_table;
use gateway_interceptor::resolve::resolve_descriptor_set_files;

const LOG_ENV: &str = "GATEWAY_INTERCEPTOR_LOG";

#[derive(Parser)]
#[command(
    name = "protoc-gen-gateway-interceptor",
    about = "Add unary interceptor support to grpc-gateway server handlers",
    version,
    after_help = "Without a subcommand, runs as a protoc plugin: \
                  protoc --gateway-interceptor_out=out_dir=gen:. api.proto"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite gateway files described by a descriptor set, outside protoc.
    Rewrite {
        /// FileDescriptorSet written by `protoc --descriptor_set_out`.
        #[arg(long, value_name = "FILE")]
        descriptor_set: PathBuf,

        /// Directory holding the generated .pb.gw.go files.
        #[arg(long, default_value = DEFAULT_OUT_DIR)]
        out_dir: PathBuf,

        /// Only rewrite the output of this proto file (repeatable).
        #[arg(long = "file", value_name = "PROTO")]
        files: Vec<String>,

        /// Print rewritten sources to stdout instead of writing them.
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Continue past files that fail to rewrite.
        #[arg(long)]
        keep_going: bool,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!("{e}");
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .compact()
        .init();
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        None => cmd_plugin(),
        Some(Commands::Rewrite {
            descriptor_set,
            out_dir,
            files,
            dry_run,
            json,
            keep_going,
        }) => cmd_rewrite(descriptor_set, out_dir, files, dry_run, json, keep_going),
    }
}

fn cmd_plugin() -> Result<(), Error> {
    serve(io::stdin().lock(), io::stdout().lock()).map(|_| ())
}

fn cmd_rewrite(
    descriptor_set: PathBuf,
    out_dir: PathBuf,
    only: Vec<String>,
    dry_run: bool,
    json: bool,
    keep_going: bool,
) -> Result<(), Error> {
    let set = read_descriptor_set(&descriptor_set)?;
    let files = resolve_descriptor_set_files(&set, &only);
    let skipped = unresolved_files(&only, &files, &set.file);
    let opts = Options {
        out_dir,
        keep_going,
    };

    let mut stdout = io::stdout().lock();
    let sink: Option<&mut dyn Write> = if dry_run { Some(&mut stdout) } else { None };
    let mut report = process_files(&files, &opts, sink)?;
    report.skipped = skipped.into_iter().chain(report.skipped).collect();

    if json {
        writeln!(stdout, "{}", report.to_json())?;
    } else {
        eprint!("{}", format_table(&report));
    }
    stdout.flush()?;

    check_complete(&report, files.len())
}
