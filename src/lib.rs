//! Dirvi: edit directory snapshots as text and turn the edits into
//! add/delete/modify/rename directives.
//!
//! A snapshot is written as numbered records (the *baseline*), copied for
//! editing (the *working* file) and later reconciled against the copy.
//! Records whose bytes did not change are skipped without parsing.
//!
//! The crate provides:
//! - The entry model and DN helpers (`entry`, `dn`)
//! - Native and LDIF record grammars (`record`)
//! - The reconciliation engine and baseline index (`engine`, `index`)
//! - Directive consumers (`sink`) and a directory abstraction (`directory`)
//! - File helpers and a resumable session layer (`io`, `session`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use dirvi::entry::Entry;
//! use dirvi::record::{LdifFormat, NativeFormat};
//! use dirvi::session::{Analysis, Session};
//!
//! let entries = vec![
//!     Entry::new("dc=example").with("dc", "example"),
//!     Entry::new("cn=admin,dc=example").with("cn", "admin"),
//! ];
//! let mut session =
//!     Session::create(NativeFormat, &entries, "baseline.txt", "working.txt").unwrap();
//!
//! // ... edit working.txt ...
//!
//! if let Analysis::Changes(stats) = session.analyze().unwrap() {
//!     println!("{stats}");
//!     session.render(LdifFormat, std::io::stdout()).unwrap();
//! }
//! ```

pub mod directory;
pub mod dn;
pub mod engine;
pub mod entry;
pub mod index;
pub mod io;
pub mod record;
pub mod session;
pub mod sink;

#[cfg(feature = "cli")]
pub mod cli;
