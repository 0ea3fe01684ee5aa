use anyhow::{ensure, Result};
use clap::Parser;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::thread;

use logsaw::{
    CancelToken, CreateParams, FieldsPostprocessor, FileMedia, HeaderFormat, LogMedia,
    MultiThreadedStrategy, ParsingStrategy, ReadDirection, SingleThreadedStrategy, StrategyConfig,
    TextEncoding,
};

mod cli;

use cli::Cli;

#[cfg(unix)]
fn install_signal_handler(cancel: CancelToken) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        for _ in signals.forever() {
            cancel.cancel();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handler(_cancel: CancelToken) -> Result<()> {
    Ok(())
}

fn build_strategy(
    args: &Cli,
    media: FileMedia,
    format: HeaderFormat,
    threads: usize,
) -> Box<dyn ParsingStrategy> {
    let mut config = StrategyConfig {
        num_workers: threads,
        ..Default::default()
    };
    if let Some(chunk_size) = args.chunk_size {
        let chunk_size = chunk_size.max(1);
        config.alignment_block_size = chunk_size;
        config.bytes_to_parse_per_thread = chunk_size;
    }
    let encoding: TextEncoding = args.encoding.into();
    let format = Arc::new(format);
    if threads <= 1 {
        let mut strategy = SingleThreadedStrategy::new(media, format)
            .with_config(config)
            .with_encoding(encoding);
        if args.jsonl {
            strategy = strategy.with_postprocessor(Arc::new(FieldsPostprocessor));
        }
        Box::new(strategy)
    } else {
        let mut strategy = MultiThreadedStrategy::new(media, format)
            .with_config(config)
            .with_encoding(encoding);
        if args.jsonl {
            strategy = strategy.with_postprocessor(Arc::new(FieldsPostprocessor));
        }
        Box::new(strategy)
    }
}

fn run() -> Result<()> {
    let args = Cli::parse();

    let cancel = CancelToken::new();
    install_signal_handler(cancel.clone())?;

    let mut media = FileMedia::open(&args.file)?;
    let size = media.size()?;
    let begin = args.from.unwrap_or(0).min(size);
    let end = args.to.unwrap_or(size).min(size);
    ensure!(begin <= end, "--from must not exceed --to");

    let format = match &args.header_regex {
        Some(pattern) => HeaderFormat::new(pattern)?,
        None => HeaderFormat::line_starts(),
    };
    let (direction, start_position) = if args.tail {
        (ReadDirection::Backward, end)
    } else {
        (ReadDirection::Forward, begin)
    };
    let threads = args.threads.unwrap_or_else(num_cpus::get);

    let mut strategy = build_strategy(&args, media, format, threads);
    strategy.parser_created(CreateParams {
        range: begin..end,
        start_position,
        direction,
        cancel: cancel.clone(),
    })?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut broken_pipe = false;
    while let Some((message, extra)) = strategy.read_next_and_postprocess()? {
        let written = if args.jsonl {
            let mut record = extra.unwrap_or_else(|| serde_json::json!({}));
            if let Some(fields) = record.as_object_mut() {
                fields.insert("text".to_string(), serde_json::json!(message.text));
            }
            writeln!(out, "{record}")
        } else {
            writeln!(out, "{}", message.text)
        };
        if let Err(err) = written {
            if err.kind() == io::ErrorKind::BrokenPipe {
                broken_pipe = true;
                break;
            }
            strategy.parser_destroyed()?;
            return Err(err.into());
        }
    }
    strategy.parser_destroyed()?;
    if !broken_pipe {
        out.flush().unwrap_or(());
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("logsaw: {err:#}");
        std::process::exit(1);
    }
}
