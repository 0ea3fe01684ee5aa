#![allow(dead_code)]

use std::sync::Arc;

use logsaw::{
    CancelToken, CreateParams, HeaderFormat, LogMessage, MemoryMedia, MultiThreadedStrategy,
    ParsingStrategy, ReadDirection, SingleThreadedStrategy, StrategyConfig,
};

/// A config with a byte-granular alignment block so tests can force chunk
/// boundaries at arbitrary offsets.
pub fn tiny_config(chunk_size: usize, workers: usize) -> StrategyConfig {
    StrategyConfig {
        alignment_block_size: 1,
        bytes_to_parse_per_thread: chunk_size,
        num_workers: workers,
        max_pooled_buffers: 8,
    }
}

pub fn single_strategy(data: &[u8], chunk_size: usize) -> SingleThreadedStrategy<MemoryMedia> {
    SingleThreadedStrategy::new(
        MemoryMedia::new(data.to_vec()),
        Arc::new(HeaderFormat::line_starts()),
    )
    .with_config(tiny_config(chunk_size, 1))
}

pub fn multi_strategy(
    data: &[u8],
    chunk_size: usize,
    workers: usize,
) -> MultiThreadedStrategy<MemoryMedia> {
    MultiThreadedStrategy::new(
        MemoryMedia::new(data.to_vec()),
        Arc::new(HeaderFormat::line_starts()),
    )
    .with_config(tiny_config(chunk_size, workers))
}

pub fn forward_params(len: u64) -> CreateParams {
    CreateParams {
        range: 0..len,
        start_position: 0,
        direction: ReadDirection::Forward,
        cancel: CancelToken::new(),
    }
}

pub fn backward_params(len: u64) -> CreateParams {
    CreateParams {
        range: 0..len,
        start_position: len,
        direction: ReadDirection::Backward,
        cancel: CancelToken::new(),
    }
}

/// Runs a full create/read/destroy session and collects every message.
pub fn parse_messages(strategy: &mut dyn ParsingStrategy, params: CreateParams) -> Vec<LogMessage> {
    strategy.parser_created(params).expect("parser_created");
    let mut messages = Vec::new();
    while let Some((message, _)) = strategy.read_next_and_postprocess().expect("read_next") {
        messages.push(message);
    }
    strategy.parser_destroyed().expect("parser_destroyed");
    messages
}

pub fn parse_texts(strategy: &mut dyn ParsingStrategy, params: CreateParams) -> Vec<String> {
    parse_messages(strategy, params)
        .into_iter()
        .map(|m| m.text)
        .collect()
}
