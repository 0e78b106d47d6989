use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;

use anyhow::*;
use camino::Utf8PathBuf;
use log::*;
use memmap2::Mmap;
use structopt::*;

use unpiz::extract::{self, FixedPasswordProvider, NoPasswordProvider, OverwritePolicy, RunOptions};
use unpiz::read::ZipArchive;
use unpiz::result::ExitCode;

#[derive(Debug, StructOpt)]
#[structopt(name = "unzip", about = "Extracts, lists, or tests a .zip archive")]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Change to the given directory before performing any operations.
    #[structopt(short = "C", long)]
    directory: Option<PathBuf>,

    /// List the archive's contents instead of extracting them.
    #[structopt(short = "l", long)]
    list: bool,

    /// Decode and CRC-check every retained entry without writing anything.
    #[structopt(short = "t", long)]
    test: bool,

    /// Directory to extract into (ignored for --list and --test).
    #[structopt(short = "d", long, default_value = ".")]
    extract_to: Utf8PathBuf,

    /// Overwrite existing files instead of skipping them.
    #[structopt(short = "o", long)]
    overwrite: bool,

    /// Password for encrypted entries.
    #[structopt(short = "P", long)]
    password: Option<String>,

    /// Only extract/list/test entries matching this glob (repeatable).
    #[structopt(short = "i", long = "include")]
    include: Vec<String>,

    /// Skip entries matching this glob (repeatable).
    #[structopt(short = "x", long = "exclude")]
    exclude: Vec<String>,

    /// Match include/exclude patterns case-insensitively.
    #[structopt(short = "I", long)]
    case_insensitive: bool,

    /// Process entries one at a time instead of fanning batches out across
    /// threads.
    #[structopt(long)]
    no_parallel: bool,

    #[structopt(name("ZIP file"))]
    zip_path: PathBuf,
}

fn main() -> ProcessExitCode {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    if errlog.init().is_err() {
        eprintln!("Couldn't initialize logging");
    }

    match run(args) {
        Ok(code) => exit_code_to_process(code),
        Err(e) => {
            error!("{:#}", e);
            exit_code_to_process(ExitCode::BadErr)
        }
    }
}

fn exit_code_to_process(code: ExitCode) -> ProcessExitCode {
    ProcessExitCode::from((code as i32) as u8)
}

fn run(args: Opt) -> Result<ExitCode> {
    if let Some(chto) = &args.directory {
        std::env::set_current_dir(chto)
            .with_context(|| format!("Couldn't set working directory to {}", chto.display()))?;
    }

    info!("Memory mapping {:#?}", &args.zip_path);
    let zip_file = File::open(&args.zip_path).context("Couldn't open zip file")?;
    let mapping = unsafe { Mmap::map(&zip_file).context("Couldn't mmap zip file")? };

    let (archive, prepended) =
        ZipArchive::with_prepended_data(&mapping).context("Couldn't load archive")?;
    if prepended > 0 {
        debug!("Archive prepended with {} bytes of unrelated data", prepended);
    }

    if args.list {
        let entries = extract::list(&archive, &args.include, &args.exclude, args.case_insensitive)?;
        for entry in entries {
            println!("{}", entry.path);
        }
        return Ok(ExitCode::Ok);
    }

    let owned_password = args.password.map(String::into_bytes);
    let fixed_password;
    let no_password = NoPasswordProvider;
    let passwords: &dyn extract::PasswordProvider = match owned_password {
        Some(p) => {
            fixed_password = FixedPasswordProvider(p);
            &fixed_password
        }
        None => &no_password,
    };

    let opts = RunOptions {
        include: args.include,
        exclude: args.exclude,
        case_insensitive: args.case_insensitive,
        overwrite: if args.overwrite {
            OverwritePolicy::Always
        } else {
            OverwritePolicy::Skip
        },
        passwords,
        parallel: !args.no_parallel,
    };

    let report = if args.test {
        extract::test(&archive, &opts)?
    } else {
        extract::extract(&archive, &args.extract_to, &opts)?
    };

    info!(
        "{} member(s) committed, {} skipped, worst severity {:?}",
        report.committed,
        report.skipped,
        report.worst.severity()
    );

    Ok(report.worst.exit_code())
}
