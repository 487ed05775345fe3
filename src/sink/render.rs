// Renders directives as change-records in either record grammar.

use std::io::{self, Write};

use super::{ChangeSink, SinkError};
use crate::entry::{Entry, Modification};
use crate::record::RecordFormat;

/// Writes each directive as a change-record of format `F`.
///
/// The first write error is kept and every later directive is rejected.
#[derive(Debug)]
pub struct Renderer<F, W> {
    format: F,
    out: W,
    error: Option<io::Error>,
}

impl<F: RecordFormat, W: Write> Renderer<F, W> {
    pub fn new(format: F, out: W) -> Self {
        Self {
            format,
            out,
            error: None,
        }
    }

    /// Write the format's file header.
    pub fn write_header(&mut self) -> io::Result<()> {
        self.format.write_header(&mut self.out)
    }

    /// The write error that stopped rendering, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(
        &mut self,
        write: impl FnOnce(&F, &mut W) -> io::Result<()>,
    ) -> Result<(), SinkError> {
        if let Some(e) = &self.error {
            return Err(SinkError::Rejected(e.to_string()));
        }
        write(&self.format, &mut self.out).map_err(|e| {
            let rejected = SinkError::Rejected(e.to_string());
            self.error = Some(e);
            rejected
        })
    }
}

impl<F: RecordFormat, W: Write> ChangeSink for Renderer<F, W> {
    fn on_add(&mut self, entry: &Entry) -> Result<(), SinkError> {
        self.emit(|f, w| f.write_add(w, entry))
    }

    fn on_delete(&mut self, _key: Option<usize>, dn: &str) -> Result<(), SinkError> {
        self.emit(|f, w| f.write_delete(w, dn))
    }

    fn on_rename(
        &mut self,
        _key: Option<usize>,
        old_dn: &str,
        new_dn: &str,
        delete_old_rdn: bool,
    ) -> Result<(), SinkError> {
        self.emit(|f, w| f.write_rename(w, old_dn, new_dn, delete_old_rdn))
    }

    fn on_modify(
        &mut self,
        _key: Option<usize>,
        _label_dn: &str,
        dn: &str,
        mods: &[Modification],
    ) -> Result<(), SinkError> {
        self.emit(|f, w| f.write_modify(w, dn, mods))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
