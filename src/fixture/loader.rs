// src/fixture/loader.rs

use std::fs;
use std::path::Path;

use crate::errors::Result;
use crate::fixture::model::{PageFixture, RawPageFixture};

/// Read and validate a page fixture.
pub fn load_fixture(path: impl AsRef<Path>) -> Result<PageFixture> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: RawPageFixture = toml::from_str(&contents)?;
    PageFixture::try_from(raw)
}
