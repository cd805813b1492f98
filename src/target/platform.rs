//! Semantic platform identity
//!
//! A `Platform` is the (architecture, OS, libc) triad a target descriptor is
//! usually built from. `clean_triple` renders it into the triple string the
//! code generation backend understands. Parsing goes the other way and is
//! best-effort: a triple the parser does not recognize simply has no
//! platform, it is still usable as a raw triple.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use target_lexicon::Triple;

/// Instruction set architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86_64,
    I686,
    Aarch64,
    Armv6l,
    Armv7l,
    Powerpc64le,
    Riscv64,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::I686 => "i686",
            Arch::Aarch64 => "aarch64",
            Arch::Armv6l => "armv6l",
            Arch::Armv7l => "armv7l",
            Arch::Powerpc64le => "powerpc64le",
            Arch::Riscv64 => "riscv64",
        }
    }

    /// Whether the 32-bit ARM call ABI suffix applies to this architecture.
    fn is_arm32(self) -> bool {
        matches!(self, Arch::Armv6l | Arch::Armv7l)
    }
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    MacOS,
    Windows,
    FreeBSD,
}

impl Os {
    /// Triple fragment for this OS, including its own leading separators.
    pub fn triple_str(self) -> &'static str {
        match self {
            Os::Linux => "-linux",
            Os::MacOS => "-apple-darwin",
            Os::Windows => "-w64-mingw32",
            Os::FreeBSD => "-unknown-freebsd",
        }
    }
}

/// C library flavour. Only meaningful on Linux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Libc {
    Glibc,
    Musl,
}

/// 32-bit ARM call ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallAbi {
    Eabi,
    Eabihf,
}

impl CallAbi {
    fn as_str(self) -> &'static str {
        match self {
            CallAbi::Eabi => "eabi",
            CallAbi::Eabihf => "eabihf",
        }
    }
}

/// Semantic identity of a compilation platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub arch: Arch,
    pub os: Os,
    #[serde(default)]
    pub libc: Option<Libc>,
    #[serde(default)]
    pub call_abi: Option<CallAbi>,
}

impl Platform {
    pub fn new(arch: Arch, os: Os) -> Self {
        let libc = match os {
            Os::Linux => Some(Libc::Glibc),
            _ => None,
        };
        let call_abi = if arch.is_arm32() && os == Os::Linux {
            Some(CallAbi::Eabihf)
        } else {
            None
        };
        Self {
            arch,
            os,
            libc,
            call_abi,
        }
    }

    pub fn with_libc(mut self, libc: Libc) -> Self {
        self.libc = Some(libc);
        self
    }

    pub fn with_call_abi(mut self, call_abi: CallAbi) -> Self {
        self.call_abi = Some(call_abi);
        self
    }

    /// Platform of the machine running this process, if it is one we model.
    pub fn host() -> Option<Self> {
        Self::parse(&Triple::host().to_string())
    }

    /// Best-effort parse of a triple string.
    ///
    /// Returns `None` for anything outside the modelled (arch, OS, libc) set.
    pub fn parse(triple: &str) -> Option<Self> {
        let parsed = Triple::from_str(triple).ok()?;

        let arch_name = parsed.architecture.to_string();
        let arch = match arch_name.as_str() {
            "x86_64" => Arch::X86_64,
            "i386" | "i586" | "i686" => Arch::I686,
            "aarch64" | "arm64" => Arch::Aarch64,
            "powerpc64le" => Arch::Powerpc64le,
            name if name.starts_with("armv7") => Arch::Armv7l,
            name if name.starts_with("armv6") => Arch::Armv6l,
            name if name.starts_with("riscv64") => Arch::Riscv64,
            _ => return None,
        };

        let os = match parsed.operating_system.to_string().as_str() {
            "linux" => Os::Linux,
            "darwin" | "macosx" => Os::MacOS,
            "windows" => Os::Windows,
            "freebsd" => Os::FreeBSD,
            _ => return None,
        };

        let env = parsed.environment.to_string();
        let libc = match os {
            Os::Linux if env.starts_with("musl") => Some(Libc::Musl),
            Os::Linux => Some(Libc::Glibc),
            _ => None,
        };
        let call_abi = if env.ends_with("eabihf") {
            Some(CallAbi::Eabihf)
        } else if env.ends_with("eabi") {
            Some(CallAbi::Eabi)
        } else {
            None
        };

        Some(Self {
            arch,
            os,
            libc,
            call_abi,
        })
    }

    /// Libc fragment of the triple, including its own leading separator.
    fn libc_str(&self) -> String {
        let libc = match (self.os, self.libc) {
            (Os::Linux, Some(Libc::Musl)) => "-musl",
            (Os::Linux, _) => "-gnu",
            _ => "",
        };
        let abi = match self.call_abi {
            Some(abi) if self.arch.is_arm32() => abi.as_str(),
            _ => "",
        };
        format!("{libc}{abi}")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&clean_triple(self))
    }
}

/// Render a platform as the triple string handed to the backend.
///
/// The result is the architecture string immediately followed by the OS
/// string and the libc string; each fragment carries its own separators.
pub fn clean_triple(platform: &Platform) -> String {
    format!(
        "{}{}{}",
        platform.arch.as_str(),
        platform.os.triple_str(),
        platform.libc_str()
    )
}
