// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

use std::process::exit;

use clap::{error::ErrorKind, Parser};

use env_logger::Env;
use log::error;
use mp3_to_opus::transcode::{transcode, Setting};

/// Exit code when the arguments are wrong.
const EXIT_CODE_USAGE: i32 = 99;

fn initialize_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_target(false)
        .format_timestamp(None)
        .init();
}

fn parse_setting() -> Setting {
    match Setting::try_parse() {
        Ok(setting) => setting,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => error.exit(),
            _ => {
                let _ = error.print();

                exit(EXIT_CODE_USAGE);
            }
        },
    }
}

fn main() {
    initialize_logging();

    let setting = parse_setting();

    println!("Input: {}", setting.input.display());
    println!("Output: {}", setting.output.display());

    match transcode(&setting) {
        Ok(summary) => {
            println!("Sample rate: {} Hz", summary.format.rate);
            println!("Channels: {}", summary.format.channels);
            println!("Encoding: {}", summary.format.encoding);
            println!("Samples written: {}", summary.frames_written);
        }
        Err(error) => {
            error!("Conversion is failed. Detail: {error}");

            exit(error.exit_code());
        }
    }
}
