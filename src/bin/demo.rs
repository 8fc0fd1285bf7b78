//! Mirrors the original demonstration driver: two threads adding disjoint
//! batches of keys while a third removes a batch that overlaps both, then
//! a final report of what's left.

use crossbeam_utils::thread;
use nbbst::Set;

const BATCH: i32 = 10_000;

fn main() {
    let set: Set<i32> = Set::new();

    thread::scope(|scope| {
        scope.spawn(|_| {
            for i in 0..BATCH {
                set.add(&i);
            }
        });
        scope.spawn(|_| {
            for i in BATCH..2 * BATCH {
                set.add(&i);
            }
        });
        scope.spawn(|_| {
            for i in (BATCH / 2)..(BATCH + BATCH / 2) {
                set.remove(&i);
            }
        });
    })
    .unwrap();

    println!("final size: {}", set.len());
}
