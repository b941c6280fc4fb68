//! Build up a throwaway parse tree in a block arena, then free it all
//! in one call.
//!
//! Run with: cargo run --example arena_scratch

use bedrock::BlockArena;

fn main() {
    env_logger::init();

    let mut arena = BlockArena::new();

    // Simulate a parser appending nodes of varying size
    let mut nodes = Vec::new();
    for node_idx in 0..10_000usize {
        let size = 16 + (node_idx % 7) * 16;
        let ptr = arena.alloc_zeroed(size);
        nodes.push((ptr, size));
    }

    // Grow the last node in place a few times, as a tokenizer appending
    // to a string would
    let (mut ptr, mut size) = nodes.pop().unwrap_or((arena.alloc(16), 16));
    for _ in 0..8 {
        ptr = unsafe { arena.resize_zeroed(ptr, size, size * 2) };
        size *= 2;
    }

    println!(
        "10k nodes in {} buckets, {} separate allocations, {} used",
        arena.bucket_count(),
        arena.separate_count(),
        bedrock::format_bytes(arena.used_bytes() as u64)
    );

    // One call tears the whole tree down
    arena.release_all();
}
