use std::{path::Path, fs::{read_to_string, write}};

use anyhow::{Result, anyhow, Context};


pub fn my_read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
    read_to_string(&path).with_context(
        || anyhow!("opening path for reading: {:?}", path.as_ref()))
}

pub fn my_write_string<P: AsRef<Path>>(path: P, contents: &str) -> Result<()> {
    write(&path, contents).with_context(
        || anyhow!("writing to path: {:?}", path.as_ref()))
}
