//! Target and job configuration for freestanding ahead-of-time compilation
//!
//! This crate sits between a dynamically specialized source language and a
//! static code generation backend. It describes what to compile for
//! (`target`), which runtime support the compiled code may call
//! (`runtime`), and assembles backend-ready jobs from a callable and its
//! argument types (`job`).
//!
//! ```no_run
//! use std::sync::Arc;
//! use freestand::dispatch::{Callable, MethodTable, Type};
//! use freestand::job::{JobOptions, build_job};
//! use freestand::target::TargetDescriptor;
//!
//! let table = Arc::new(MethodTable::new("main"));
//! table.define("identity", vec![Type::Any]);
//!
//! let target = TargetDescriptor::host()?;
//! let (job, _residual) = build_job(
//!     &Callable::new("identity"),
//!     &[Type::Float64],
//!     JobOptions::new().target(&target).method_table(table),
//! )?;
//! assert_eq!(job.name(), "identity");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod job;
pub mod link;
pub mod runtime;
pub mod target;

pub use job::{CompilerJob, JobError, JobOptions, build_job};
pub use target::{Platform, TargetDescriptor, TargetError, clean_triple};
