use std::io::{self, Write};

use serde::Serialize;

use crate::app::{AnalyzeResult, DownloadResult, MetadataResult, RunResult};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_metadata(result: &MetadataResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_analyze(result: &AnalyzeResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
