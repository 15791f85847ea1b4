//! Thin CLI front-end over [`ilnc::Compiler`]: parses a handful of flags,
//! wires up the default assembly resolver and runtime probe, and writes
//! whatever artifacts the compiler produces to an output directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ilnc::config::{BuildConfiguration, DependencyManifest, RuntimeDirectory};
use ilnc::resolver::DefaultAssemblyResolver;
use ilnc::Compiler;

struct Args {
    root_assembly: PathBuf,
    output_dir: PathBuf,
    runtime_root: Option<PathBuf>,
    debug: bool,
    read_debug_symbols: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut root_assembly = None;
    let mut output_dir = None;
    let mut runtime_root = None;
    let mut debug = false;
    let mut read_debug_symbols = false;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--out" => output_dir = Some(PathBuf::from(iter.next().ok_or("--out requires a path")?)),
            "--runtime" => runtime_root = Some(PathBuf::from(iter.next().ok_or("--runtime requires a path")?)),
            "--debug" => debug = true,
            "--read-debug-symbols" => read_debug_symbols = true,
            other if root_assembly.is_none() => root_assembly = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument: {other}")),
        }
    }

    Ok(Args {
        root_assembly: root_assembly.ok_or("usage: ilnc <root-assembly> [--out DIR] [--runtime DIR] [--debug] [--read-debug-symbols]")?,
        output_dir: output_dir.unwrap_or_else(|| PathBuf::from("out")),
        runtime_root,
        debug,
        read_debug_symbols,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let root_dir = args.root_assembly.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let module_name = args
        .root_assembly
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or("root assembly path has no file name")?
        .to_string();

    let manifest_path = root_dir.join(format!("{module_name}.deps.json"));
    let manifest = DependencyManifest::read(&manifest_path).map_err(|err| format!("{err}"))?;
    let extra_paths = manifest.as_ref().map(|m| m.runtime_dll_directories()).unwrap_or_default();
    let known_user_assemblies = manifest
        .as_ref()
        .map(|m| {
            m.dependencies
                .iter()
                .filter(|dep| dep.kind == ilnc::config::DependencyKind::Project)
                .map(|dep| dep.name.clone())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let runtime = args
        .runtime_root
        .as_deref()
        .map(|root| RuntimeDirectory::probe(root, "ilnc.runtime"))
        .transpose()
        .map_err(|err| format!("{err}"))?;

    let resolver = DefaultAssemblyResolver::new(&root_dir, runtime.as_ref(), extra_paths);
    let config = BuildConfiguration { read_debug_symbols: args.read_debug_symbols, debug: args.debug };
    let compiler = Compiler::new(&resolver, config).with_known_user_assemblies(known_user_assemblies);

    let output = compiler.compile(&args.root_assembly, &module_name).map_err(|err| format!("{err}"))?;

    std::fs::create_dir_all(&args.output_dir).map_err(|err| format!("creating {}: {err}", args.output_dir.display()))?;
    write_artifact(&args.output_dir, &format!("{module_name}.h"), &output.artifacts.header)?;
    write_artifact(&args.output_dir, &format!("{module_name}.cpp"), &output.artifacts.source)?;
    if let Some(entry) = &output.artifacts.entry {
        write_artifact(&args.output_dir, "main.cpp", entry)?;
    }
    write_artifact(&args.output_dir, "CMakeLists.txt", &output.artifacts.build_file)?;

    eprintln!("{}", output.diagnostics.summary());
    Ok(())
}

fn write_artifact(dir: &Path, name: &str, contents: &str) -> Result<(), String> {
    let path = dir.join(name);
    std::fs::write(&path, contents).map_err(|err| format!("writing {}: {err}", path.display()))
}
