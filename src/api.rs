//! The public entry points: encode and decode object graphs against
//! streams, byte slices, and files.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;

use crate::error::{KnotcodeError, Result};
use crate::graph::ObjectGraph;
use crate::hooks::{Binder, LifecycleSink, SurrogateSelector};
use crate::io::{WireReader, WireWriter};
use crate::parser::read_graph;
use crate::schema::TypeRegistry;
use crate::writer::write_graph;

/// Default cap on any single length-driven allocation: 64 MiB.
pub const DEFAULT_MAX_PREALLOC: usize = 64 * 1024 * 1024;

/// Knobs for the write side.
#[derive(Clone, Default)]
pub struct EncodeOptions {
    /// Renames types for emission via [`Binder::bind_to_wire`].
    pub binder: Option<Arc<dyn Binder>>,
    /// Replaces field enumeration for selected types.
    pub surrogates: Option<Arc<dyn SurrogateSelector>>,
    /// Receives the post-encode notification.
    pub sink: Option<Arc<dyn LifecycleSink>>,
}

impl EncodeOptions {
    /// Options with every hook disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a type binder.
    pub fn with_binder(mut self, binder: Arc<dyn Binder>) -> Self {
        self.binder = Some(binder);
        self
    }

    /// Installs a surrogate selector.
    pub fn with_surrogates(mut self, surrogates: Arc<dyn SurrogateSelector>) -> Self {
        self.surrogates = Some(surrogates);
        self
    }

    /// Installs a lifecycle sink.
    pub fn with_sink(mut self, sink: Arc<dyn LifecycleSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

/// Knobs for the read side.
#[derive(Clone)]
pub struct DecodeOptions {
    /// Known types. Required for the schema flavors that carry member
    /// names but no member types; optional otherwise, in which case
    /// registered types are checked against the wire schema.
    pub registry: Option<Arc<TypeRegistry>>,
    /// Remaps wire type names before registry lookup.
    pub binder: Option<Arc<dyn Binder>>,
    /// Replaces member restoration for selected types.
    pub surrogates: Option<Arc<dyn SurrogateSelector>>,
    /// Receives per-object and post-decode notifications.
    pub sink: Option<Arc<dyn LifecycleSink>>,
    /// Cap on any single length-driven allocation, in elements or
    /// bytes. Wire lengths above it are treated as malformed.
    pub max_prealloc: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            registry: None,
            binder: None,
            surrogates: None,
            sink: None,
            max_prealloc: DEFAULT_MAX_PREALLOC,
        }
    }
}

impl DecodeOptions {
    /// Options with no registry, no hooks, and the default allocation
    /// cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a type registry.
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Installs a type binder.
    pub fn with_binder(mut self, binder: Arc<dyn Binder>) -> Self {
        self.binder = Some(binder);
        self
    }

    /// Installs a surrogate selector.
    pub fn with_surrogates(mut self, surrogates: Arc<dyn SurrogateSelector>) -> Self {
        self.surrogates = Some(surrogates);
        self
    }

    /// Installs a lifecycle sink.
    pub fn with_sink(mut self, sink: Arc<dyn LifecycleSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Overrides the allocation cap.
    pub fn with_max_prealloc(mut self, cap: usize) -> Self {
        self.max_prealloc = cap;
        self
    }
}

/// The main entry point for serializing and deserializing object
/// graphs.
#[derive(Debug)]
pub struct Knotcode;

impl Knotcode {
    /// Serializes `graph` into `out` as one complete record stream.
    pub fn encode_to<W: Write>(graph: &ObjectGraph, out: W, opts: &EncodeOptions) -> Result<()> {
        let mut writer = WireWriter::new(out);
        write_graph(graph, &mut writer, opts)
    }

    /// Serializes `graph` into a fresh byte buffer.
    pub fn encode_to_vec(graph: &ObjectGraph, opts: &EncodeOptions) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        Self::encode_to(graph, &mut buf, opts)?;
        Ok(buf)
    }

    /// Deserializes one record stream from `input`.
    ///
    /// The reader is left positioned just past the end-of-stream
    /// marker; trailing bytes, if any, are the caller's business.
    pub fn decode_from<R: Read>(input: R, opts: &DecodeOptions) -> Result<ObjectGraph> {
        let mut reader = WireReader::new(input);
        read_graph(&mut reader, opts)
    }

    /// Deserializes a record stream that must span `bytes` exactly.
    pub fn decode_slice(bytes: &[u8], opts: &DecodeOptions) -> Result<ObjectGraph> {
        let mut reader = WireReader::new(bytes);
        let graph = read_graph(&mut reader, opts)?;
        let consumed = reader.position() as usize;
        if consumed != bytes.len() {
            return Err(KnotcodeError::malformed(format!(
                "{} byte(s) of trailing data after the end-of-stream marker",
                bytes.len() - consumed
            )));
        }
        Ok(graph)
    }

    /// Serializes `graph` to a file.
    pub fn save<P: AsRef<Path>>(
        graph: &ObjectGraph,
        path: P,
        opts: &EncodeOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), "saving object graph");
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        Self::encode_to(graph, &mut out, opts)?;
        out.flush()?;
        Ok(())
    }

    /// Deserializes a file through a memory map.
    pub fn load<P: AsRef<Path>>(path: P, opts: &DecodeOptions) -> Result<ObjectGraph> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading object graph");
        let file = File::open(path)?;

        // Safety: mmap is fundamentally unsafe as external processes
        // could modify the file. We assume exclusive access or accept
        // the risk for performance (standard practice).
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        Self::decode_slice(&mmap, opts)
    }
}
