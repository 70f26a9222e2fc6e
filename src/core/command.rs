use std::path::PathBuf;

use crate::core::error::PlotterError;
use crate::core::job::JobDescriptor;

pub const PLOT_SIZE: &str = "32";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    pub program: String,
    pub prefix_args: Vec<String>,
}

impl Executable {
    pub fn parse(command_line: &str) -> Result<Self, PlotterError> {
        let mut words = shell_words::split(command_line).map_err(|err| {
            PlotterError::InvalidCommand {
                message: err.to_string(),
            }
        })?;
        if words.is_empty() {
            return Err(PlotterError::InvalidCommand {
                message: "plotter executable is empty".to_string(),
            });
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            prefix_args: words,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PlotCommand {
    pub fingerprint: Option<String>,
    pub key_pair: Option<(String, String)>,
    pub ram_mib: Option<u32>,
    pub threads: Option<u32>,
    pub temp_dir: PathBuf,
    pub dest_dir: PathBuf,
}

impl PlotCommand {
    pub fn from_descriptor(descriptor: &JobDescriptor, min_ram_mib: u32) -> Self {
        let key = &descriptor.key;
        let fingerprint = if key.fingerprint.trim().is_empty() {
            None
        } else {
            Some(key.fingerprint.trim().to_string())
        };
        let key_pair = if fingerprint.is_none()
            && !key.farmer_key.trim().is_empty()
            && !key.pool_key.trim().is_empty()
        {
            Some((
                key.farmer_key.trim().to_string(),
                key.pool_key.trim().to_string(),
            ))
        } else {
            None
        };

        Self {
            fingerprint,
            key_pair,
            ram_mib: (descriptor.ram_mib > min_ram_mib).then_some(descriptor.ram_mib),
            threads: (descriptor.threads > 0).then_some(descriptor.threads),
            temp_dir: descriptor.temp_dir.clone(),
            dest_dir: descriptor.dest_dir.clone(),
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "plots".to_string(),
            "create".to_string(),
            "-k".to_string(),
            PLOT_SIZE.to_string(),
        ];

        if let Some(fingerprint) = &self.fingerprint {
            args.push("-a".to_string());
            args.push(fingerprint.clone());
        } else if let Some((farmer, pool)) = &self.key_pair {
            args.push("-f".to_string());
            args.push(farmer.clone());
            args.push("-p".to_string());
            args.push(pool.clone());
        }

        if let Some(ram) = self.ram_mib {
            args.push("-b".to_string());
            args.push(ram.to_string());
        }

        if let Some(threads) = self.threads {
            args.push("-r".to_string());
            args.push(threads.to_string());
        }

        args.push("-t".to_string());
        args.push(self.temp_dir.display().to_string());
        args.push("-d".to_string());
        args.push(self.dest_dir.display().to_string());

        args
    }
}
