use std::{
    env, process,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use log::LevelFilter;
use logrotator::{
    archive::TarArchiver, options::Options, rotator::LogRotator, storage::file::FileStorage,
};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signum: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn usage() {
    println!("logrotatord - log rotation and archival daemon");
    println!();
    println!("USAGE:");
    println!("    logrotatord [OPTIONS] [WATCH_DIR]");
    println!();
    println!("ARGS:");
    println!("    WATCH_DIR            directory to watch (default: var/log/)");
    println!();
    println!("OPTIONS:");
    println!("    -g, --generations N  depth of the generation ring (default: 5)");
    println!("    -v, --verbose        debug logging");
    println!("    -h, --help           print this help");
    println!("    -V, --version        print the version");
}

fn main() {
    let mut watch_dir = "var/log/".to_owned();
    let mut max_generations = 5usize;
    let mut verbose = false;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                usage();
                return;
            }
            "-V" | "--version" => {
                println!("logrotatord {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "-v" | "--verbose" => verbose = true,
            "-g" | "--generations" => {
                i += 1;
                max_generations = match args.get(i).and_then(|v| v.parse().ok()) {
                    Some(n) => n,
                    None => {
                        eprintln!("logrotatord: --generations expects an integer");
                        process::exit(1);
                    }
                };
            }
            other => watch_dir = other.to_owned(),
        }
        i += 1;
    }

    let options = Options {
        max_generations,
        logger_level: if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        ..Options::default()
    };

    let mut rotator = match LogRotator::open(
        options,
        &watch_dir,
        FileStorage::default(),
        TarArchiver::default(),
    ) {
        Ok(rotator) => rotator,
        Err(e) => {
            eprintln!("logrotatord: {}", e);
            process::exit(1);
        }
    };

    unsafe {
        libc::signal(libc::SIGINT, request_shutdown as libc::sighandler_t);
        libc::signal(libc::SIGTERM, request_shutdown as libc::sighandler_t);
    }

    while !SHUTDOWN.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }

    if let Err(e) = rotator.close() {
        eprintln!("logrotatord: shutdown failed: {}", e);
        process::exit(1);
    }
}
