//! Linking compiled objects with an external C toolchain
//!
//! The compiler comes from the target descriptor. Host targets without one
//! fall back to whatever `clang`/`gcc`/`cc` is on the PATH; cross targets
//! without one are an error, never a silent host build.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};
use serde_json::Value;
use thiserror::Error;

use crate::job::OptionMap;
use crate::target::TargetDescriptor;

/// Artifact kind produced by linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Object file (.o)
    Object,
    /// Static library (.a)
    StaticLib,
    /// Shared library (.so/.dylib/.dll)
    SharedLib,
    /// Executable
    #[default]
    Executable,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link failed: no compiler configured for cross target `{triple}`; set one with `set_compiler`")]
    MissingCompiler { triple: String },

    #[error("link failed: no suitable linker found (tried clang, gcc, cc)")]
    NoHostLinker,

    #[error("link failed: no object files to link")]
    NoObjects,

    #[error("link failed: object output takes exactly one input, got {count}")]
    MultipleObjects { count: usize },

    #[error("link failed: could not execute `{tool}`: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("link failed: `{tool}` exited with code {code:?}")]
    ToolFailed { tool: String, code: Option<i32> },

    #[error("link failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Detect available linker on the system
fn detect_linker() -> Option<PathBuf> {
    ["clang", "gcc", "cc"]
        .into_iter()
        .find(|tool| Command::new(tool).arg("--version").output().is_ok())
        .map(PathBuf::from)
}

/// A configured invocation of the external compiler driver.
#[derive(Debug, Clone)]
pub struct Linker {
    compiler: PathBuf,
    triple: String,
    flags: Vec<String>,
}

impl Linker {
    /// Pick the compiler for `target`.
    pub fn for_target(target: &TargetDescriptor) -> Result<Self, LinkError> {
        let compiler = match target.compiler() {
            Some(path) => path.to_path_buf(),
            None if target.is_host() => detect_linker().ok_or(LinkError::NoHostLinker)?,
            None => {
                return Err(LinkError::MissingCompiler {
                    triple: target.triple().to_string(),
                });
            }
        };
        debug!("linker: {} for {}", compiler.display(), target.triple());
        Ok(Self {
            compiler,
            triple: target.triple().to_string(),
            flags: Vec::new(),
        })
    }

    pub fn compiler(&self) -> &Path {
        &self.compiler
    }

    pub fn triple(&self) -> &str {
        &self.triple
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn arg(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Consume the link-step options a job left over: `cflags` (string or
    /// list of strings) and `libraries` (list of library names).
    pub fn with_options(mut self, options: &OptionMap) -> Self {
        match options.get("cflags") {
            Some(Value::String(flags)) => {
                self.flags.extend(flags.split_whitespace().map(str::to_string));
            }
            Some(Value::Array(items)) => {
                self.flags
                    .extend(items.iter().filter_map(Value::as_str).map(str::to_string));
            }
            Some(other) => warn!("linker: ignoring cflags {}", other),
            None => {}
        }
        if let Some(Value::Array(libs)) = options.get("libraries") {
            self.flags
                .extend(libs.iter().filter_map(Value::as_str).map(|lib| format!("-l{lib}")));
        }
        self
    }

    /// Build the compiler driver command for an executable or shared library.
    pub fn command(&self, objects: &[PathBuf], output: &Path, format: OutputFormat) -> Command {
        let mut cmd = Command::new(&self.compiler);
        for obj in objects {
            cmd.arg(obj);
        }
        cmd.args(&self.flags);
        if format == OutputFormat::SharedLib {
            cmd.arg("-shared");
        }
        cmd.arg("-o").arg(output);
        cmd
    }

    /// Link object files into `output`.
    pub fn link(
        &self,
        objects: &[PathBuf],
        output: &Path,
        format: OutputFormat,
    ) -> Result<(), LinkError> {
        if objects.is_empty() {
            return Err(LinkError::NoObjects);
        }

        match format {
            OutputFormat::Object => {
                if objects.len() > 1 {
                    return Err(LinkError::MultipleObjects {
                        count: objects.len(),
                    });
                }
                std::fs::copy(&objects[0], output)?;
                return Ok(());
            }
            OutputFormat::StaticLib => return create_static_library(objects, output),
            OutputFormat::Executable | OutputFormat::SharedLib => {}
        }

        let mut cmd = self.command(objects, output, format);
        debug!("linker: executing {:?}", cmd);
        let tool = self.compiler.display().to_string();
        let status = cmd.status().map_err(|source| LinkError::Spawn {
            tool: tool.clone(),
            source,
        })?;

        if !status.success() {
            return Err(LinkError::ToolFailed {
                tool,
                code: status.code(),
            });
        }

        Ok(())
    }
}

/// Create a static library from object files
pub fn create_static_library(objects: &[PathBuf], output: &Path) -> Result<(), LinkError> {
    let mut cmd = Command::new("ar");
    cmd.arg("rcs").arg(output);

    for obj in objects {
        cmd.arg(obj);
    }

    let status = cmd.status().map_err(|source| LinkError::Spawn {
        tool: "ar".into(),
        source,
    })?;

    if !status.success() {
        return Err(LinkError::ToolFailed {
            tool: "ar".into(),
            code: status.code(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Arch, Os, Platform};
    use serde_json::json;
    use std::ffi::OsStr;

    fn foreign_platform() -> Platform {
        match Platform::host() {
            Some(host) if host.arch == Arch::X86_64 => Platform::new(Arch::Aarch64, Os::Linux),
            _ => Platform::new(Arch::X86_64, Os::Linux),
        }
    }

    #[test]
    fn test_cross_target_without_compiler_fails() {
        let target = TargetDescriptor::from_platform(foreign_platform()).unwrap();
        match Linker::for_target(&target) {
            Err(LinkError::MissingCompiler { triple }) => assert_eq!(triple, target.triple()),
            other => panic!("expected MissingCompiler, got {:?}", other),
        }
    }

    #[test]
    fn test_configured_compiler_is_used() {
        let mut target = TargetDescriptor::from_platform(foreign_platform()).unwrap();
        target.set_compiler("/opt/cross/bin/cc");
        let linker = Linker::for_target(&target).unwrap();
        assert_eq!(linker.compiler(), Path::new("/opt/cross/bin/cc"));
        assert_eq!(linker.triple(), target.triple());
    }

    #[test]
    fn test_shared_library_command() {
        let mut target = TargetDescriptor::from_platform(foreign_platform()).unwrap();
        target.set_compiler("cross-cc");
        let linker = Linker::for_target(&target).unwrap().arg("-nostdlib");

        let cmd = linker.command(&[PathBuf::from("a.o")], Path::new("liba.so"), OutputFormat::SharedLib);
        assert_eq!(cmd.get_program(), OsStr::new("cross-cc"));
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["a.o", "-nostdlib", "-shared", "-o", "liba.so"]);
    }

    #[test]
    fn test_residual_options_become_flags() {
        let mut options = OptionMap::new();
        options.insert("cflags".into(), json!("-static -O2"));
        options.insert("libraries".into(), json!(["m", "c"]));

        let mut target = TargetDescriptor::from_platform(foreign_platform()).unwrap();
        target.set_compiler("cross-cc");
        let linker = Linker::for_target(&target).unwrap().with_options(&options);
        assert_eq!(linker.flags(), ["-static", "-O2", "-lm", "-lc"]);
    }

    #[test]
    fn test_missing_tool_reports_spawn_error() {
        let mut target = TargetDescriptor::from_platform(foreign_platform()).unwrap();
        target.set_compiler("/nonexistent/freestand-cc");
        let linker = Linker::for_target(&target).unwrap();
        let err = linker
            .link(&[PathBuf::from("main.o")], Path::new("main"), OutputFormat::Executable)
            .unwrap_err();
        assert!(matches!(err, LinkError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/freestand-cc"));
    }

    #[test]
    fn test_no_objects() {
        let mut target = TargetDescriptor::from_platform(foreign_platform()).unwrap();
        target.set_compiler("cc");
        let linker = Linker::for_target(&target).unwrap();
        assert!(matches!(
            linker.link(&[], Path::new("out"), OutputFormat::Executable),
            Err(LinkError::NoObjects)
        ));
    }

    #[test]
    fn test_object_output_is_copied() {
        let dir = std::env::temp_dir().join(format!("freestand-link-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let obj = dir.join("in.o");
        let out = dir.join("out.o");
        std::fs::write(&obj, b"\x7fELF").unwrap();

        let mut target = TargetDescriptor::from_platform(foreign_platform()).unwrap();
        target.set_compiler("cc");
        Linker::for_target(&target)
            .unwrap()
            .link(&[obj], &out, OutputFormat::Object)
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"\x7fELF");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_object_output_rejects_several_inputs() {
        let dir = std::env::temp_dir().join(format!("freestand-link-multi-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("a.o");
        let b = dir.join("b.o");
        let out = dir.join("out.o");
        std::fs::write(&a, b"AAAA").unwrap();
        std::fs::write(&b, b"BBBB").unwrap();

        let mut target = TargetDescriptor::from_platform(foreign_platform()).unwrap();
        target.set_compiler("cc");
        let err = Linker::for_target(&target)
            .unwrap()
            .link(&[a, b], &out, OutputFormat::Object)
            .unwrap_err();
        assert!(matches!(err, LinkError::MultipleObjects { count: 2 }));
        assert!(!out.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
