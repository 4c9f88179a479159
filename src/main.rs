use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use mirror_rs::object_id::ObjectId;
use mirror_rs::{Command, Options, Outcome, Session, SessionReport, TcpTransport};

fn usage(exe: &str) -> String {
    format!(
        "usage: {exe} [flags] <clone|pull|verify>\n\
         \n\
         flags:\n\
         \x20 --host=<host>        remote host (required)\n\
         \x20 --port=<port>        remote port (default 80)\n\
         \x20 --repo=<path>        repository URL path, e.g. /acme/widgets (required)\n\
         \x20 --branch=<name>      branch to track (default main)\n\
         \x20 --target=<dir>       worktree directory (required)\n\
         \x20 --workdir=<dir>      manifest/pack directory (default /var/db/mirror-rs)\n\
         \x20 --label=<name>       manifest filename stem (default: repo basename)\n\
         \x20 --want=<hex>         override the discovered remote tip\n\
         \x20 --have=<hex>         override the locally held tip\n\
         \x20 -c, --clone          force a full fetch regardless of manifest\n\
         \x20 --keep-pack          save the fetched pack in the work directory\n\
         \x20 --use-pack           replay the saved pack instead of fetching\n\
         \x20 -v                   increase verbosity (repeatable)\n\
         \x20 -h, --help           this text\n"
    )
}

struct ParsedArgs {
    options: Options,
    command: Command,
}

fn parse_args(args: &[String], exe: &str) -> Result<ParsedArgs, String> {
    let mut host = None;
    let mut port = 80u16;
    let mut repo = None;
    let mut branch = "main".to_string();
    let mut target = None;
    let mut workdir = PathBuf::from("/var/db/mirror-rs");
    let mut label = None;
    let mut want = None;
    let mut have = None;
    let mut force_clone = false;
    let mut keep_pack = false;
    let mut use_pack = false;
    let mut verbosity = 0u8;
    let mut command = None;

    for arg in args {
        if let Some(value) = arg.strip_prefix("--host=") {
            host = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--port=") {
            port = value.parse().map_err(|_| format!("bad port: {value}"))?;
        } else if let Some(value) = arg.strip_prefix("--repo=") {
            repo = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--branch=") {
            branch = value.to_string();
        } else if let Some(value) = arg.strip_prefix("--target=") {
            target = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--workdir=") {
            workdir = PathBuf::from(value);
        } else if let Some(value) = arg.strip_prefix("--label=") {
            label = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--want=") {
            want = Some(parse_hash(value)?);
        } else if let Some(value) = arg.strip_prefix("--have=") {
            have = Some(parse_hash(value)?);
        } else {
            match arg.as_str() {
                "-c" | "--clone" => force_clone = true,
                "--keep-pack" => keep_pack = true,
                "--use-pack" => use_pack = true,
                "-v" => verbosity = verbosity.saturating_add(1),
                "-vv" => verbosity = verbosity.saturating_add(2),
                "-h" | "--help" => {
                    eprintln!("{}", usage(exe));
                    std::process::exit(0);
                }
                "clone" => command = Some(Command::Clone),
                "pull" => command = Some(Command::Pull),
                "verify" => command = Some(Command::Verify),
                other => return Err(format!("unknown argument: {other}\n\n{}", usage(exe))),
            }
        }
    }

    let command = command.ok_or_else(|| format!("no command given\n\n{}", usage(exe)))?;
    let host = host.ok_or("missing --host")?;
    let repo = repo.ok_or("missing --repo")?;
    let target = target.ok_or("missing --target")?;
    let label = label.unwrap_or_else(|| {
        repo.rsplit('/')
            .find(|part| !part.is_empty())
            .unwrap_or("mirror")
            .to_string()
    });

    Ok(ParsedArgs {
        options: Options {
            host,
            port,
            repository_path: repo,
            branch,
            target_directory: target,
            work_directory: workdir,
            label,
            want,
            have,
            clone: force_clone,
            keep_pack,
            use_pack,
            verbosity,
        },
        command,
    })
}

fn parse_hash(value: &str) -> Result<ObjectId, String> {
    ObjectId::from_hex(value.as_bytes()).map_err(|err| format!("bad hash {value}: {err}"))
}

fn report_fetch(report: &SessionReport, verbosity: u8, action: &str) {
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    if verbosity >= 1 {
        for path in &report.writes.changed_paths {
            println!(" {path}");
        }
        println!(
            "{action} {} ({} written, {} unchanged)",
            report.tip, report.writes.files_written, report.writes.files_skipped
        );
    }
    if verbosity >= 2 {
        eprintln!(
            "pack: {} commits, {} trees, {} blobs, {} tags, {} ofs-deltas, {} ref-deltas",
            report.pack.commits,
            report.pack.trees,
            report.pack.blobs,
            report.pack.tags,
            report.pack.ofs_deltas,
            report.pack.ref_deltas
        );
        eprintln!(
            "resolve: {} deltas, longest chain {}, {} bases recovered locally",
            report.resolve.resolved, report.resolve.longest_chain, report.recovered_bases
        );
    }
}

fn main() -> ExitCode {
    let mut args = env::args();
    let exe = args.next().unwrap_or_else(|| "mirror-rs".to_string());
    let args: Vec<String> = args.collect();

    let parsed = match parse_args(&args, &exe) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };

    let verbosity = parsed.options.verbosity;
    let transport = TcpTransport::new(parsed.options.host.clone(), parsed.options.port);
    let mut session = Session::new(parsed.options, transport);

    match session.run(parsed.command) {
        Ok(Outcome::Cloned(report)) => {
            report_fetch(&report, verbosity, "cloned");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Updated(report)) => {
            report_fetch(&report, verbosity, "updated");
            ExitCode::SUCCESS
        }
        Ok(Outcome::UpToDate { tip }) => {
            if verbosity >= 1 {
                println!("up to date ({tip})");
            }
            ExitCode::SUCCESS
        }
        Ok(Outcome::Verified { checked }) => {
            if verbosity >= 1 {
                println!("verified {checked} paths");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{exe}: {err}");
            ExitCode::FAILURE
        }
    }
}
