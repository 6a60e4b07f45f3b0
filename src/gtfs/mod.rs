use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::warn;
use zip::ZipArchive;

mod avl;
mod config;
pub mod models;
pub use avl::*;
pub use config::*;
use models::*;

use crate::shared::time::Time;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Could not find file with name: {0}")]
    FileNotFound(String),
    #[error("Invalid time: {0}")]
    InvalidTime(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

#[derive(Debug, Default)]
pub enum StorageType {
    #[default]
    None,
    Zip(PathBuf),
    Directory(PathBuf),
}

/// Streams the rows of a GTFS feed, either zipped or unpacked in a directory.
#[derive(Debug, Default)]
pub struct GtfsReader {
    config: Config,
    storage: StorageType,
}

impl GtfsReader {
    pub fn new(config: self::Config) -> Self {
        Self {
            config,
            storage: Default::default(),
        }
    }

    pub fn from_zip<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage = StorageType::Zip(path.into());
        self
    }

    pub fn from_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage = StorageType::Directory(path.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stream_stops<F>(&self, f: F) -> Result<(), self::Error>
    where
        F: FnMut((usize, GtfsStop)),
    {
        self.stream(&self.config.stops_file_name, f)
    }

    pub fn stream_routes<F>(&self, f: F) -> Result<(), self::Error>
    where
        F: FnMut((usize, GtfsRoute)),
    {
        self.stream(&self.config.routes_file_name, f)
    }

    pub fn stream_trips<F>(&self, f: F) -> Result<(), self::Error>
    where
        F: FnMut((usize, GtfsTrip)),
    {
        self.stream(&self.config.trips_file_name, f)
    }

    pub fn stream_stop_times<F>(&self, f: F) -> Result<(), self::Error>
    where
        F: FnMut((usize, GtfsStopTime)),
    {
        self.stream(&self.config.stop_times_file_name, f)
    }

    pub fn stream_shapes<F>(&self, f: F) -> Result<(), self::Error>
    where
        F: FnMut((usize, GtfsShape)),
    {
        self.stream(&self.config.shapes_file_name, f)
    }

    pub fn stream_calendar<F>(&self, f: F) -> Result<(), self::Error>
    where
        F: FnMut((usize, GtfsCalendar)),
    {
        self.stream(&self.config.calendar_file_name, f)
    }

    pub fn stream_calendar_dates<F>(&self, f: F) -> Result<(), self::Error>
    where
        F: FnMut((usize, GtfsCalendarDate)),
    {
        self.stream(&self.config.calendar_dates_file_name, f)
    }

    pub fn stream_route_dirtags<F>(&self, f: F) -> Result<(), self::Error>
    where
        F: FnMut((usize, GtfsRouteDirtag)),
    {
        self.stream(&self.config.route_dirtags_file_name, f)
    }

    fn stream<T, F>(&self, file_name: &str, f: F) -> Result<(), self::Error>
    where
        T: DeserializeOwned,
        F: FnMut((usize, T)),
    {
        match &self.storage {
            StorageType::None => Ok(()),
            StorageType::Zip(path) => stream_from_zip(path, file_name, f),
            StorageType::Directory(path) => stream_from_directory(path, file_name, f),
        }
    }
}

/// `YYYYMMDD` as used by the calendar files.
pub fn parse_date(value: &str) -> Result<NaiveDate, self::Error> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d")
        .map_err(|_| self::Error::InvalidDate(value.to_string()))
}

/// `HH:MM:SS`, hours may run past 24.
pub fn parse_time(value: &str) -> Result<Time, self::Error> {
    Time::from_hms(value).ok_or_else(|| self::Error::InvalidTime(value.to_string()))
}

fn stream_from_zip<T, F>(zip_path: &Path, file_name: &str, f: F) -> Result<(), self::Error>
where
    T: DeserializeOwned,
    F: FnMut((usize, T)),
{
    let zip_file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(zip_file)?;
    let index = archive
        .index_for_name(file_name)
        .ok_or(self::Error::FileNotFound(file_name.to_string()))?;
    let file = archive.by_index(index)?;
    stream_records(file, file_name, f);
    Ok(())
}

fn stream_from_directory<T, F>(dir: &Path, file_name: &str, f: F) -> Result<(), self::Error>
where
    T: DeserializeOwned,
    F: FnMut((usize, T)),
{
    let path = dir.join(file_name);
    if !path.is_file() {
        return Err(self::Error::FileNotFound(file_name.to_string()));
    }
    let file = File::open(path)?;
    stream_records(file, file_name, f);
    Ok(())
}

/// Rows that fail to deserialize are skipped and counted.
pub(crate) fn stream_records<R, T, F>(reader: R, file_name: &str, f: F)
where
    R: Read,
    T: DeserializeOwned,
    F: FnMut((usize, T)),
{
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut skipped = 0;
    reader
        .deserialize()
        .filter_map(|row: Result<T, csv::Error>| match row {
            Ok(row) => Some(row),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .enumerate()
        .for_each(f);
    if skipped > 0 {
        warn!("Skipped {skipped} malformed rows in {file_name}");
    }
}
