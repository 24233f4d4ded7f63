mod ir;
mod metadata;
mod opcodes;
mod resolver;
mod scan;
mod signature;
#[cfg(test)]
mod testbytes;

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use serde_sarif::sarif::{
    Artifact, Invocation, Location, LogicalLocation, Message, Result as SarifResult, Run, Sarif,
    Tool, ToolComponent, SCHEMA_URL,
};

use crate::ir::MethodRef;
use crate::metadata::ClasspathMetadataSource;
use crate::resolver::VisitedMethodFinder;
use crate::scan::scan_inputs;

/// CLI arguments for invokescope execution.
#[derive(Parser, Debug)]
#[command(
    name = "invokescope",
    about = "Resolve the full set of methods a JVM method invokes, including implicit toString() calls.",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
    /// Class declaring the target method, dotted or slashed.
    #[arg(long, value_name = "CLASS")]
    class: String,
    #[arg(long, value_name = "NAME")]
    method: String,
    #[arg(long, value_name = "DESCRIPTOR")]
    descriptor: String,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    for entry in &cli.classpath {
        if !entry.exists() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
    }

    let started_at = Instant::now();
    let scan = scan_inputs(&cli.input, &cli.classpath)?;
    let class_count = scan.class_count;
    let source = ClasspathMetadataSource::new(scan.classes);

    // Class names normalize to slash form at the boundary.
    let class_name = cli.class.replace('.', "/");
    let visited = VisitedMethodFinder::new(&source, &cli.method, &cli.descriptor)?
        .resolve(&class_name)?;
    let visited_count = visited.len();

    let invocation = build_invocation();
    let results = build_results(&visited);
    let sarif = build_sarif(scan.artifacts, results, invocation);

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &sarif)
        .context("failed to serialize SARIF output")?;
    writer
        .write_all(b"\n")
        .context("failed to write SARIF output")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} classes={} visited_methods={}",
            started_at.elapsed().as_millis(),
            class_count,
            visited_count
        );
    }

    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

fn build_invocation() -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

fn build_results(visited: &BTreeSet<MethodRef>) -> Vec<SarifResult> {
    visited
        .iter()
        .map(|method| {
            let dispatch = if method.is_static { "static" } else { "instance" };
            let message = result_message(format!(
                "Visited {} method: {}.{}{}",
                dispatch, method.owner, method.name, method.descriptor
            ));
            let location = method_location(&method.owner, &method.name, &method.descriptor);
            SarifResult::builder()
                .message(message)
                .locations(vec![location])
                .build()
        })
        .collect()
}

fn method_location(class_name: &str, method_name: &str, descriptor: &str) -> Location {
    let logical = LogicalLocation::builder()
        .name(format!("{class_name}.{method_name}{descriptor}"))
        .kind("function")
        .build();
    Location::builder().logical_locations(vec![logical]).build()
}

fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}

fn build_sarif(artifacts: Vec<Artifact>, results: Vec<SarifResult>, invocation: Invocation) -> Sarif {
    let driver = ToolComponent::builder().name("invokescope").build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = if artifacts.is_empty() {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .build()
    } else {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .artifacts(artifacts)
            .build()
    };

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}
