use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    let manifest_dir =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir
        .ancestors()
        .nth(2)
        .expect("workspace root")
        .to_path_buf();
    let schema_dir = workspace_root.join("contracts/v1");
    let openapi_path = workspace_root.join("openapi/v1.yaml");

    println!("cargo:rerun-if-changed={}", schema_dir.display());
    println!("cargo:rerun-if-changed={}", openapi_path.display());

    let mut schema_files: Vec<PathBuf> = fs::read_dir(&schema_dir)
        .expect("read contracts/v1")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_schema_file(path))
        .collect();
    schema_files.sort();

    let mut set_digest = Sha256::new();
    let mut entries = Vec::with_capacity(schema_files.len());
    for path in &schema_files {
        println!("cargo:rerun-if-changed={}", path.display());
        let body = fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("schema file name")
            .to_string();

        set_digest.update(name.as_bytes());
        set_digest.update([0]);
        set_digest.update(body.as_bytes());
        set_digest.update([0]);

        let digest = to_hex(&Sha256::digest(body.as_bytes()));
        entries.push((name, digest, body));
    }

    let openapi = fs::read(&openapi_path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", openapi_path.display()));
    let openapi_digest = to_hex(&Sha256::digest(&openapi));
    let set_digest = to_hex(&set_digest.finalize());
    let built_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut out = String::new();
    out.push_str(&format!("pub const OPENAPI_SHA256: &str = {openapi_digest:?};\n"));
    out.push_str(&format!("pub const SCHEMA_SET_SHA256: &str = {set_digest:?};\n"));
    out.push_str(&format!("pub const BUILT_AT: &str = {built_at:?};\n"));
    out.push_str("pub const SCHEMA_FILES: &[(&str, &str, &str)] = &[\n");
    for (name, digest, body) in entries {
        out.push_str(&format!("    ({name:?}, {digest:?}, {body:?}),\n"));
    }
    out.push_str("];\n");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR"));
    fs::write(out_dir.join("schemas.rs"), out).expect("write schemas.rs");
}

fn is_schema_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(".schema.json"))
        .unwrap_or(false)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
