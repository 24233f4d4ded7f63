use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use serde_sarif::sarif::{Artifact, ArtifactLocation, ArtifactRoles};
use zip::ZipArchive;

use crate::metadata::{parse_class_record, ClassRecord};

/// Snapshot of parsed artifacts, class records and counts for a scan.
pub(crate) struct ScanOutput {
    pub(crate) artifacts: Vec<Artifact>,
    pub(crate) class_count: usize,
    pub(crate) classes: Vec<ClassRecord>,
}

pub(crate) fn scan_inputs(input: &Path, classpath: &[PathBuf]) -> Result<ScanOutput> {
    let mut artifacts = Vec::new();
    let mut class_count = 0;
    let mut classes = Vec::new();

    scan_path(input, true, true, &mut artifacts, &mut class_count, &mut classes)?;

    // Keep deterministic ordering by sorting classpath entries and directory listings.
    let mut classpath_entries = classpath.to_vec();
    classpath_entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in classpath_entries {
        scan_path(&entry, false, true, &mut artifacts, &mut class_count, &mut classes)?;
    }

    Ok(ScanOutput {
        artifacts,
        class_count,
        classes,
    })
}

fn scan_path(
    path: &Path,
    is_input: bool,
    strict: bool,
    artifacts: &mut Vec<Artifact>,
    class_count: &mut usize,
    classes: &mut Vec<ClassRecord>,
) -> Result<()> {
    if path.is_dir() {
        scan_dir(path, artifacts, class_count, classes)?;
        return Ok(());
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    let roles = if is_input {
        Some(vec![serde_json::to_value(ArtifactRoles::AnalysisTarget)
            .expect("serialize artifact role")])
    } else {
        None
    };

    match extension {
        "class" => scan_class_file(path, roles, artifacts, class_count, classes),
        "jar" => scan_jar_file(path, roles, artifacts, class_count, classes),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn scan_dir(
    path: &Path,
    artifacts: &mut Vec<Artifact>,
    class_count: &mut usize,
    classes: &mut Vec<ClassRecord>,
) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        if entry.is_dir() {
            scan_dir(&entry, artifacts, class_count, classes)?;
        } else {
            scan_path(&entry, false, false, artifacts, class_count, classes)?;
        }
    }

    Ok(())
}

fn scan_class_file(
    path: &Path,
    roles: Option<Vec<Value>>,
    artifacts: &mut Vec<Artifact>,
    class_count: &mut usize,
    classes: &mut Vec<ClassRecord>,
) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let record =
        parse_class_record(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    *class_count += 1;

    push_path_artifact(path, roles, data.len() as u64, None, artifacts)?;
    classes.push(record);
    Ok(())
}

fn scan_jar_file(
    path: &Path,
    roles: Option<Vec<Value>>,
    artifacts: &mut Vec<Artifact>,
    class_count: &mut usize,
    classes: &mut Vec<ClassRecord>,
) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let jar_len = fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .len();
    let jar_index = push_path_artifact(path, roles, jar_len, None, artifacts)?;

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class") && !name.ends_with("module-info.class") {
            entry_names.push(name);
        }
    }

    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let record = parse_class_record(&data)
            .with_context(|| format!("failed to parse {}:{}", path.display(), name))?;
        *class_count += 1;

        let entry_uri = jar_entry_uri(path, &name);
        push_artifact(entry_uri, entry.size(), Some(jar_index), None, artifacts);
        classes.push(record);
    }

    Ok(())
}

/// Push a path-based artifact and return its index for parent linkage (e.g., JAR entries).
fn push_path_artifact(
    path: &Path,
    roles: Option<Vec<Value>>,
    len: u64,
    parent_index: Option<i64>,
    artifacts: &mut Vec<Artifact>,
) -> Result<i64> {
    let uri = path_to_uri(path);
    Ok(push_artifact(uri, len, parent_index, roles, artifacts))
}

fn push_artifact(
    uri: String,
    len: u64,
    parent_index: Option<i64>,
    roles: Option<Vec<Value>>,
    artifacts: &mut Vec<Artifact>,
) -> i64 {
    let location = ArtifactLocation::builder().uri(uri).build();
    let artifact = match (parent_index, roles) {
        (Some(parent_index), Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .roles(roles)
            .build(),
        (Some(parent_index), None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .build(),
        (None, Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .roles(roles)
            .build(),
        (None, None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .build(),
    };
    let index = artifacts.len() as i64;
    artifacts.push(artifact);
    index
}

fn path_to_uri(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn jar_entry_uri(jar_path: &Path, entry_name: &str) -> String {
    format!("jar:{}!/{}", jar_path.to_string_lossy(), entry_name)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
