//! Dispatch scheduling.
//!
//! `next_for` picks the oldest eligible request for a client: never
//! dispatched (or dispatched longer than [`TIMEOUT_MS`] ago) and belonging
//! to a queue with no live cooldown for that client.  The cooldown timer is
//! set on dispatch, not on delivery — that caps how often any client is
//! offered work from a queue, which is the only rate limit the dispatcher
//! can enforce without trusting clients.

use dispatch_protocol::JobOffer;

use crate::cooldown::encode_timers;
use crate::queue::DEFAULT_DELAY_MS;
use crate::state::Core;

/// A dispatched request becomes eligible again this long after
/// `started_at`; `attempts` increments on the re-dispatch.
pub const TIMEOUT_MS: i64 = 10_000;

/// Result of a successful `next_for` call: the offer to send to the client
/// and the client's freshly encoded timers for persistence.
pub struct Dispatch {
    pub offer: JobOffer,
    pub timers_encoded: String,
}

impl Core {
    pub fn next_for(&mut self, client_id: &str, now_ms: i64) -> Option<Dispatch> {
        let Core {
            queues,
            requests,
            clients,
            cooldowns,
        } = self;

        let timers = cooldowns.entry(client_id.to_owned()).or_default();
        timers.retain(|_, unlock_at| *unlock_at > now_ms);

        let mut eligible = 0usize;
        let mut best: Option<(&String, std::time::Instant)> = None;
        for (key, request) in requests.iter() {
            let idle = request
                .started_at
                .map_or(true, |started_at| now_ms - started_at >= TIMEOUT_MS);
            if !idle || timers.contains_key(&request.queue_name) {
                continue;
            }
            eligible += 1;
            if best.map_or(true, |(_, created)| request.created_at < created) {
                best = Some((key, request.created_at));
            }
        }

        let key = best?.0.clone();
        let request = requests.get_mut(&key)?;
        if request.started_at.is_some() {
            request.attempts += 1;
        }
        request.started_at = Some(now_ms);

        let delay_ms = queues
            .resolve(&request.queue_name)
            .map_or(DEFAULT_DELAY_MS, |queue| queue.delay_ms);
        timers.insert(request.queue_name.clone(), now_ms + delay_ms as i64);

        let stats = clients.entry(client_id.to_owned()).or_default();
        stats.started += 1;

        Some(Dispatch {
            offer: JobOffer {
                key,
                href: request.href.clone(),
                headers: request.headers.clone(),
                total: eligible,
            },
            timers_encoded: encode_timers(timers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Handler;

    const NOW: i64 = 1_700_000_000_000;

    fn core_with_queue(delay_ms: u64) -> Core {
        let mut core = Core::new();
        core.queues.register("q.example", delay_ms, &[]);
        core
    }

    fn enqueue(core: &mut Core, key: &str, href: &str) {
        core.requests.attach(
            key,
            href,
            None,
            key.split('/').next().unwrap(),
            Handler::Webhook("http://hook.example/r".to_owned()),
        );
    }

    #[test]
    fn dispatches_the_oldest_eligible_request() {
        let mut core = core_with_queue(1_000);
        core.queues.register("other.example", 1_000, &[]);
        enqueue(&mut core, "q.example/first", "http://q.example/1");
        enqueue(&mut core, "other.example/second", "http://other.example/2");

        let dispatch = core.next_for("client-a", NOW).unwrap();
        assert_eq!(dispatch.offer.key, "q.example/first");
        assert_eq!(dispatch.offer.total, 2);
    }

    #[test]
    fn cooldown_blocks_the_queue_for_that_client_only() {
        let mut core = core_with_queue(1_000);
        enqueue(&mut core, "q.example/a", "http://q.example/a");
        enqueue(&mut core, "q.example/b", "http://q.example/b");

        assert!(core.next_for("client-a", NOW).is_some());
        assert!(core.next_for("client-a", NOW).is_none());
        assert!(core.next_for("client-b", NOW).is_some());
    }

    #[test]
    fn cooldown_expires_after_the_queue_delay() {
        let mut core = core_with_queue(1_000);
        enqueue(&mut core, "q.example/a", "http://q.example/a");
        enqueue(&mut core, "q.example/b", "http://q.example/b");

        assert!(core.next_for("client-a", NOW).is_some());
        assert!(core.next_for("client-a", NOW + 999).is_none());
        // The first request is still dispatched (no timeout yet), so only
        // the second is offered once the cooldown lapses.
        let dispatch = core.next_for("client-a", NOW + 1_000).unwrap();
        assert_eq!(dispatch.offer.key, "q.example/b");
    }

    #[test]
    fn dispatch_sets_the_cooldown_to_now_plus_delay() {
        let mut core = core_with_queue(1_000);
        enqueue(&mut core, "q.example/a", "http://q.example/a");

        let dispatch = core.next_for("client-a", NOW).unwrap();
        let unlock_at = core.cooldowns["client-a"]["q.example"];
        assert_eq!(unlock_at, NOW + 1_000);
        assert_eq!(
            dispatch.timers_encoded,
            format!("q.example,{}", NOW + 1_000)
        );
    }

    #[test]
    fn a_dispatched_request_is_not_offered_until_it_times_out() {
        let mut core = core_with_queue(1_000);
        enqueue(&mut core, "q.example/a", "http://q.example/a");

        assert!(core.next_for("client-a", NOW).is_some());
        assert!(core.next_for("client-b", NOW + TIMEOUT_MS - 1).is_none());

        let retry = core.next_for("client-b", NOW + TIMEOUT_MS).unwrap();
        assert_eq!(retry.offer.key, "q.example/a");
        assert_eq!(core.requests.get("q.example/a").unwrap().attempts, 1);
    }

    #[test]
    fn a_never_dispatched_request_is_eligible_regardless_of_age() {
        let mut core = core_with_queue(1_000);
        enqueue(&mut core, "q.example/a", "http://q.example/a");
        assert!(core.requests.get("q.example/a").unwrap().started_at.is_none());
        assert!(core.next_for("client-a", NOW).is_some());
        assert_eq!(core.requests.get("q.example/a").unwrap().attempts, 0);
    }

    #[test]
    fn empty_table_yields_none() {
        let mut core = core_with_queue(1_000);
        assert!(core.next_for("client-a", NOW).is_none());
    }

    #[test]
    fn total_counts_every_eligible_request_at_pick_time() {
        let mut core = core_with_queue(1_000);
        core.queues.register("r.example", 1_000, &[]);
        enqueue(&mut core, "q.example/a", "http://q.example/a");
        enqueue(&mut core, "q.example/b", "http://q.example/b");
        enqueue(&mut core, "r.example/c", "http://r.example/c");

        let first = core.next_for("client-a", NOW).unwrap();
        assert_eq!(first.offer.total, 3);
        // q.example now cools down; only r.example/c remains eligible.
        let second = core.next_for("client-a", NOW).unwrap();
        assert_eq!(second.offer.key, "r.example/c");
        assert_eq!(second.offer.total, 1);
    }

    #[test]
    fn dispatch_increments_the_client_started_count() {
        let mut core = core_with_queue(1_000);
        enqueue(&mut core, "q.example/a", "http://q.example/a");
        core.next_for("client-a", NOW);
        assert_eq!(core.clients["client-a"].started, 1);
    }

    #[test]
    fn unregistered_queue_falls_back_to_the_default_delay() {
        let mut core = Core::new();
        enqueue(&mut core, "ghost.example/a", "http://ghost.example/a");
        core.next_for("client-a", NOW);
        assert_eq!(
            core.cooldowns["client-a"]["ghost.example"],
            NOW + DEFAULT_DELAY_MS as i64
        );
    }
}
