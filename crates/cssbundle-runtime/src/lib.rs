/*
 * cssbundle-runtime
 * Copyright (c) 2025 Posit, PBC
 *
 * Runtime abstraction layer for cssbundle file access.
 *
 * The stylesheet build touches files only through SystemRuntime. NativeRuntime
 * maps it onto std::fs; MemoryRuntime keeps a virtual tree for hosts and tests.
 */

mod memory;
mod native;
pub mod sass_native;
mod traits;

pub use traits::{PathKind, PathMetadata, RuntimeError, RuntimeResult, SystemRuntime};

pub use memory::{MemoryRuntime, VirtualFileSystem};
pub use native::NativeRuntime;

pub use sass_native::{EmbeddedResourceProvider, RuntimeFs, compile_scss_with_fs};
