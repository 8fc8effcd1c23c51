//! In-memory engine for exercising the transcoder and the pipeline.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use super::{EngineError, FractionFn, TranscodeEngine};

/// Scripted engine: the stream copy and the encode each succeed or fail on demand
pub(crate) struct ScriptedEngine {
    pub(crate) supported: bool,
    pub(crate) load_ok: bool,
    pub(crate) copy_ok: bool,
    pub(crate) encode_ok: bool,
    pub(crate) files: StdMutex<HashMap<String, Vec<u8>>>,
    pub(crate) execs: StdMutex<Vec<Vec<String>>>,
    pub(crate) loads: AtomicUsize,
    pub(crate) probes: AtomicUsize,
}

impl ScriptedEngine {
    pub(crate) fn new(supported: bool, load_ok: bool, copy_ok: bool, encode_ok: bool) -> Self {
        Self {
            supported,
            load_ok,
            copy_ok,
            encode_ok,
            files: StdMutex::new(HashMap::new()),
            execs: StdMutex::new(Vec::new()),
            loads: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TranscodeEngine for ScriptedEngine {
    async fn is_supported(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.supported
    }

    async fn load(&self) -> Result<(), EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.load_ok {
            Ok(())
        } else {
            Err(EngineError::Load("encoder missing".into()))
        }
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        self.files.lock().unwrap().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn exec(&self, args: &[String], on_progress: FractionFn) -> Result<(), EngineError> {
        self.execs.lock().unwrap().push(args.to_vec());
        let copy = args.iter().any(|a| a == "copy");
        let ok = if copy { self.copy_ok } else { self.encode_ok };
        if !copy {
            on_progress(0.3);
            on_progress(0.2);
            on_progress(0.8);
        }
        if !ok {
            return Err(EngineError::Exec {
                code: Some(1),
                message: "codec not supported".into(),
            });
        }
        let output = args.last().unwrap().clone();
        let tag: &[u8] = if copy { b"copied" } else { b"encoded" };
        self.files.lock().unwrap().insert(output, tag.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Io(std::io::ErrorKind::NotFound.into()))
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.files.lock().unwrap().remove(name);
        Ok(())
    }
}
