// src/fixture/mod.rs

//! Page fixtures for headless replay.
//!
//! A fixture describes a page (URL plus initial elements) and a timeline of
//! changes the page makes to itself. [`replay::build_document`] turns it into
//! a [`crate::dom::MemoryDocument`]; [`replay::replay_timeline`] plays the
//! timeline against it in (tokio) time.

pub mod loader;
pub mod model;
pub mod replay;

pub use loader::load_fixture;
pub use model::{EventAction, PageEvent, PageFixture, PageNode, RawPageFixture, SetAttr};
pub use replay::{build_document, replay_timeline};
