//! Tests for the playback resolver state machine

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::error::Error;
    use crate::models::{RefreshAck, StreamingItem, StreamingLink};
    use crate::resolver::classify::Strategy;
    use crate::resolver::machine::*;

    const ITEM: i64 = 7;

    fn link(id: i64, url: &str, active: bool) -> StreamingLink {
        StreamingLink {
            id,
            quality: "HD".to_string(),
            language: "EN".to_string(),
            source_url: url.to_string(),
            is_active: active,
            last_checked: None,
        }
    }

    fn item(links: Vec<StreamingLink>, refreshing: bool) -> StreamingItem {
        StreamingItem {
            id: ITEM,
            imdb_id: "tt0000007".to_string(),
            title: "Test Movie".to_string(),
            year: Some(2020),
            content_type: Default::default(),
            poster_url: None,
            synopsis: None,
            created_at: None,
            updated_at: None,
            links,
            refreshing,
        }
    }

    fn fetch_ticket(effects: &[Effect]) -> FetchTicket {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Fetch(t) => Some(*t),
                _ => None,
            })
            .expect("expected a fetch effect")
    }

    fn attach(effects: &[Effect]) -> Option<SurfaceRequest> {
        effects.iter().find_map(|e| match e {
            Effect::Attach(r) => Some(r.clone()),
            _ => None,
        })
    }

    fn refresh_cycle(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::RequestLinkRefresh { cycle, .. } => Some(*cycle),
                _ => None,
            })
            .expect("expected a refresh request")
    }

    fn notices(effects: &[Effect]) -> usize {
        effects.iter().filter(|e| matches!(e, Effect::Notify(_))).count()
    }

    /// Resolver that finished its first load with `links`.
    fn loaded(links: Vec<StreamingLink>, now: Instant) -> (Resolver, Vec<Effect>) {
        let mut r = Resolver::new(ITEM, ResolverSettings::default());
        let ticket = fetch_ticket(&r.start());
        let effects = r.on_item_fetched(ticket, Ok(item(links, false)), now);
        (r, effects)
    }

    #[test]
    fn test_first_load_selects_first_active_link() {
        let now = Instant::now();
        let (r, effects) = loaded(
            vec![
                link(1, "https://cdn.example.com/a.mp4", false),
                link(2, "https://cdn.example.com/b.mp4", true),
                link(3, "https://cdn.example.com/c.mp4", true),
            ],
            now,
        );
        assert_eq!(r.state().selected_link, Some(2));
        assert!(r.state().loading_video);
        assert!(!r.state().playback_error);
        let req = attach(&effects).unwrap();
        assert_eq!(req.plan, SurfacePlan::NativeVideo);
        assert_eq!(req.strategy, Strategy::DirectVideo);
        // Direct files never arm the load timeout
        assert!(r.load_deadline().is_none());
    }

    #[test]
    fn test_inactive_link_is_never_selected() {
        let now = Instant::now();
        let (mut r, _) = loaded(
            vec![link(1, "https://a.example/embed/1", true), link(2, "https://b.example/embed/2", false)],
            now,
        );
        assert!(r.select_link(2, now).is_empty());
        assert_eq!(r.state().selected_link, Some(1));
        assert!(r.select_link(99, now).is_empty());
        assert_eq!(r.state().selected_link, Some(1));
    }

    #[test]
    fn test_switching_link_resets_flags_and_releases_old_surface() {
        let now = Instant::now();
        let (mut r, effects) = loaded(
            vec![link(1, "https://a.example/embed/1", true), link(2, "https://cdn.example.com/x.m3u8", true)],
            now,
        );
        let first = attach(&effects).unwrap();
        r.on_surface_signal(1, first.epoch, SurfaceSignal::Error);
        assert!(r.state().playback_error);
        assert!(!r.state().loading_video);

        let effects = r.select_link(2, now);
        assert!(r.state().loading_video);
        assert!(!r.state().playback_error);
        assert_eq!(effects[0], Effect::Release { link_id: 1 });
        let req = attach(&effects).unwrap();
        assert_eq!(req.plan, SurfacePlan::AdaptiveHelper);
        assert!(r.load_deadline().is_none());
    }

    #[test]
    fn test_native_adaptive_uses_video_surface() {
        let now = Instant::now();
        let settings = ResolverSettings { native_adaptive: true, ..Default::default() };
        let mut r = Resolver::new(ITEM, settings);
        let ticket = fetch_ticket(&r.start());
        let effects = r.on_item_fetched(
            ticket,
            Ok(item(vec![link(1, "https://cdn.example.com/x.m3u8?t=1", true)], false)),
            now,
        );
        assert_eq!(attach(&effects).unwrap().plan, SurfacePlan::NativeVideo);
    }

    #[test]
    fn test_blocked_host_attaches_nothing() {
        let now = Instant::now();
        let (r, effects) = loaded(vec![link(1, "https://1flix.to/watch-movie/x-1.mp4", true)], now);
        assert_eq!(r.state().selected_link, Some(1));
        assert_eq!(r.strategy(), Some(Strategy::ExternalOpen));
        assert!(attach(&effects).is_none());
        assert!(r.load_deadline().is_none());
        assert!(!r.state().loading_video);
        assert!(!r.state().playback_error);
    }

    #[test]
    fn test_stale_signal_for_previous_link_is_ignored() {
        let now = Instant::now();
        let (mut r, effects) = loaded(
            vec![link(1, "https://a.example/embed/1", true), link(2, "https://b.example/embed/2", true)],
            now,
        );
        let old = attach(&effects).unwrap();
        r.select_link(2, now);
        let before = r.state().clone();

        r.on_surface_signal(1, old.epoch, SurfaceSignal::Loaded);
        assert_eq!(*r.state(), before);
        r.on_surface_signal(1, old.epoch, SurfaceSignal::Error);
        assert_eq!(*r.state(), before);
        assert!(r.state().loading_video);
    }

    #[test]
    fn test_frame_load_clears_flags_and_cancels_timeout() {
        let now = Instant::now();
        let (mut r, effects) = loaded(vec![link(1, "https://a.example/embed/1", true)], now);
        let req = attach(&effects).unwrap();
        assert_eq!(req.plan, SurfacePlan::Frame);
        assert_eq!(r.load_deadline(), Some(now + Duration::from_secs(20)));

        r.on_surface_signal(1, req.epoch, SurfaceSignal::Loaded);
        assert!(!r.state().loading_video);
        assert!(!r.state().playback_error);
        assert!(r.load_deadline().is_none());
        assert!(r.tick(now + Duration::from_secs(60)).is_empty());
        assert!(!r.state().playback_error);
    }

    #[test]
    fn test_timeout_fires_exactly_once() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![link(1, "https://a.example/watch/1", true)], now);
        assert_eq!(r.strategy(), Some(Strategy::Fallback));

        assert!(r.tick(now + Duration::from_secs(19)).is_empty());
        assert!(r.state().loading_video);

        let effects = r.tick(now + Duration::from_secs(20));
        assert_eq!(notices(&effects), 1);
        assert!(r.state().playback_error);
        assert!(!r.state().loading_video);

        assert!(r.tick(now + Duration::from_secs(40)).is_empty());
        assert!(r.load_deadline().is_none());
    }

    #[test]
    fn test_timeout_restarts_on_link_change() {
        let now = Instant::now();
        let (mut r, _) = loaded(
            vec![link(1, "https://a.example/embed/1", true), link(2, "https://b.example/embed/2", true)],
            now,
        );
        let later = now + Duration::from_secs(15);
        r.select_link(2, later);
        assert_eq!(r.load_deadline(), Some(later + Duration::from_secs(20)));
        // The first link's window passing does not fail the second link
        assert!(r.tick(now + Duration::from_secs(21)).is_empty());
        assert!(!r.state().playback_error);
    }

    #[test]
    fn test_video_signals() {
        let now = Instant::now();
        let (mut r, effects) = loaded(vec![link(1, "https://cdn.example.com/a.webm", true)], now);
        let req = attach(&effects).unwrap();
        r.on_surface_signal(1, req.epoch, SurfaceSignal::DataReady);
        assert!(!r.state().loading_video);
        assert!(!r.state().playback_error);
    }

    #[test]
    fn test_helper_fatal_sets_error() {
        let now = Instant::now();
        let (mut r, effects) = loaded(vec![link(1, "https://cdn.example.com/live.m3u8", true)], now);
        let req = attach(&effects).unwrap();
        r.on_surface_signal(1, req.epoch, SurfaceSignal::HelperFatal);
        assert!(r.state().playback_error);
        assert!(!r.state().loading_video);
    }

    #[test]
    fn test_retry_reissues_surface_and_ignores_old_epoch() {
        let now = Instant::now();
        let (mut r, effects) = loaded(vec![link(1, "https://a.example/embed/1", true)], now);
        let first = attach(&effects).unwrap();
        r.tick(now + Duration::from_secs(20));
        assert!(r.state().playback_error);

        let later = now + Duration::from_secs(30);
        let effects = r.retry(later);
        let reload = match &effects[..] {
            [Effect::Reload(req)] => req.clone(),
            other => panic!("unexpected effects: {:?}", other),
        };
        assert_eq!(reload.url, first.url);
        assert!(reload.epoch > first.epoch);
        assert!(r.state().loading_video);
        assert!(!r.state().playback_error);
        assert_eq!(r.load_deadline(), Some(later + Duration::from_secs(20)));

        // Late error from the abandoned attempt
        r.on_surface_signal(1, first.epoch, SurfaceSignal::Error);
        assert!(!r.state().playback_error);
        r.on_surface_signal(1, reload.epoch, SurfaceSignal::Loaded);
        assert!(!r.state().loading_video);
    }

    #[test]
    fn test_retry_without_surface_is_noop() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![link(1, "https://1flix.to/x", true)], now);
        assert!(r.retry(now).is_empty());
    }

    #[test]
    fn test_refresh_then_links_after_nineteen_polls() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![], now);
        assert_eq!(r.state().selected_link, None);

        let effects = r.request_refresh(now);
        assert!(matches!(effects[..], [Effect::RequestLinkRefresh { item_id: ITEM, .. }]));
        assert!(r.state().refreshing);
        assert_eq!(r.phase(), RefreshPhase::Refreshing);

        let mut t = now;
        for attempt in 1..=19 {
            // Not due yet
            assert!(r.tick(t + Duration::from_secs(2)).is_empty());
            t += Duration::from_secs(3);
            let ticket = fetch_ticket(&r.tick(t));
            assert_eq!(ticket.purpose, FetchPurpose::Poll);
            r.on_item_fetched(ticket, Ok(item(vec![], true)), t);
            assert_eq!(r.state().poll_attempt, attempt);
            assert!(r.state().refreshing);
        }

        t += Duration::from_secs(3);
        let ticket = fetch_ticket(&r.tick(t));
        let effects = r.on_item_fetched(
            ticket,
            Ok(item(vec![link(5, "https://x.example/inactive", false), link(6, "https://y.example/embed/6", true)], false)),
            t,
        );
        assert_eq!(r.state().selected_link, Some(6));
        assert_eq!(r.state().poll_attempt, 0);
        assert!(!r.state().refreshing);
        assert_eq!(r.phase(), RefreshPhase::Settled);
        assert!(attach(&effects).is_some());
    }

    #[test]
    fn test_refresh_gives_up_after_twenty_polls() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![], now);
        r.request_refresh(now);

        let mut t = now;
        let mut last = Vec::new();
        for _ in 0..20 {
            t += Duration::from_secs(3);
            let ticket = fetch_ticket(&r.tick(t));
            last = r.on_item_fetched(ticket, Ok(item(vec![], true)), t);
        }
        assert!(!r.state().refreshing);
        assert_eq!(r.state().selected_link, None);
        assert_eq!(r.phase(), RefreshPhase::Settled);
        // Reported as an outcome, not an error
        assert!(last.iter().any(|e| matches!(e, Effect::Notify(n) if !n.is_error())));
        // No further polls
        assert!(r.tick(t + Duration::from_secs(30)).is_empty());

        // A new refresh starts over
        assert!(!r.request_refresh(t).is_empty());
        assert_eq!(r.state().poll_attempt, 0);
        assert!(r.state().refreshing);
    }

    #[test]
    fn test_refresh_ignored_while_refreshing() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![], now);
        assert!(!r.request_refresh(now).is_empty());
        assert!(r.request_refresh(now).is_empty());
    }

    #[test]
    fn test_refresh_ack_failure_returns_to_idle() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![], now);
        let cycle = match r.request_refresh(now)[..] {
            [Effect::RequestLinkRefresh { cycle, .. }] => cycle,
            _ => unreachable!(),
        };
        let effects = r.on_refresh_ack(cycle, Err(Error::Transport("connection refused".to_string())));
        assert_eq!(notices(&effects), 1);
        assert!(!r.state().refreshing);
        assert_eq!(r.phase(), RefreshPhase::Idle);
        assert!(r.tick(now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_refresh_ack_success_keeps_polling() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![], now);
        let cycle = refresh_cycle(&r.request_refresh(now));
        let ack = RefreshAck { message: "Link refresh started".to_string(), status: "processing".to_string() };
        assert!(r.on_refresh_ack(cycle, Ok(ack)).is_empty());
        assert!(r.state().refreshing);
    }

    #[test]
    fn test_poll_network_failure_resets_to_idle() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![], now);
        r.request_refresh(now);
        let t = now + Duration::from_secs(3);
        let ticket = fetch_ticket(&r.tick(t));
        r.on_item_fetched(ticket, Ok(item(vec![], true)), t);
        let t = t + Duration::from_secs(3);
        let ticket = fetch_ticket(&r.tick(t));
        let effects = r.on_item_fetched(ticket, Err(Error::http(500, "")), t);
        assert_eq!(notices(&effects), 1);
        assert!(!r.state().refreshing);
        assert_eq!(r.state().poll_attempt, 0);
        assert_eq!(r.phase(), RefreshPhase::Idle);
    }

    #[test]
    fn test_server_done_without_links_settles() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![], now);
        r.request_refresh(now);
        let t = now + Duration::from_secs(3);
        let ticket = fetch_ticket(&r.tick(t));
        r.on_item_fetched(ticket, Ok(item(vec![link(1, "https://a.example/1", false)], false)), t);
        assert!(!r.state().refreshing);
        assert_eq!(r.state().selected_link, None);
    }

    #[test]
    fn test_initial_load_while_server_refreshing_starts_polling() {
        let now = Instant::now();
        let mut r = Resolver::new(ITEM, ResolverSettings::default());
        let ticket = fetch_ticket(&r.start());
        let effects = r.on_item_fetched(ticket, Ok(item(vec![], true)), now);
        assert!(effects.is_empty());
        assert!(r.state().refreshing);
        let poll = r.tick(now + Duration::from_secs(3));
        assert_eq!(fetch_ticket(&poll).purpose, FetchPurpose::Poll);
    }

    #[test]
    fn test_initial_load_failure_is_reported() {
        let mut r = Resolver::new(ITEM, ResolverSettings::default());
        let ticket = fetch_ticket(&r.start());
        assert!(r.is_loading());
        let effects = r.on_item_fetched(ticket, Err(Error::http(404, "Not found.")), Instant::now());
        assert_eq!(notices(&effects), 1);
        assert_eq!(r.load_error(), Some("Not found."));
        assert!(!r.is_loading());
        assert!(!r.state().refreshing);
    }

    #[test]
    fn test_poll_result_after_teardown_is_discarded() {
        let now = Instant::now();
        let (mut r, effects) = loaded(vec![], now);
        assert!(effects.is_empty());
        r.request_refresh(now);
        let t = now + Duration::from_secs(3);
        let ticket = fetch_ticket(&r.tick(t));

        assert!(r.teardown().is_empty());
        let effects = r.on_item_fetched(ticket, Ok(item(vec![link(1, "https://a.example/embed/1", true)], false)), t);
        assert!(effects.is_empty());
        assert_eq!(r.state().selected_link, None);
        assert!(!r.state().refreshing);
        assert!(r.tick(t + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_teardown_releases_surface_and_cancels_timer() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![link(1, "https://a.example/embed/1", true)], now);
        assert_eq!(r.teardown(), vec![Effect::Release { link_id: 1 }]);
        assert!(r.load_deadline().is_none());
        assert!(r.tick(now + Duration::from_secs(60)).is_empty());
        assert!(!r.state().playback_error);
        // Signals after teardown do nothing
        assert!(r.on_surface_signal(1, 1, SurfaceSignal::Error).is_empty());
        assert!(!r.state().playback_error);
        assert!(r.teardown().is_empty());
    }

    #[test]
    fn test_result_for_other_item_is_discarded() {
        let now = Instant::now();
        let mut r = Resolver::new(ITEM, ResolverSettings::default());
        let mut ticket = fetch_ticket(&r.start());
        ticket.item_id = ITEM + 1;
        let effects = r.on_item_fetched(ticket, Ok(item(vec![link(1, "https://a.example/embed/1", true)], false)), now);
        assert!(effects.is_empty());
        assert!(r.item().is_none());
    }

    #[test]
    fn test_superseded_poll_ticket_is_discarded() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![], now);
        let cycle = refresh_cycle(&r.request_refresh(now));
        let t = now + Duration::from_secs(3);
        let stale = fetch_ticket(&r.tick(t));
        // Network failure on the ack ends the cycle, a new one starts
        r.on_refresh_ack(cycle, Err(Error::Transport("reset".to_string())));
        r.request_refresh(t);
        let effects = r.on_item_fetched(stale, Ok(item(vec![link(1, "https://a.example/embed/1", true)], false)), t);
        assert!(effects.is_empty());
        assert_eq!(r.state().selected_link, None);
        assert!(r.state().refreshing);
    }

    #[test]
    fn test_validate_drops_deactivated_selection() {
        let now = Instant::now();
        let (mut r, _) = loaded(
            vec![link(1, "https://a.example/embed/1", true), link(2, "https://cdn.example.com/b.mp4", true)],
            now,
        );
        let ticket = fetch_ticket(&r.validate());
        assert_eq!(ticket.purpose, FetchPurpose::Validate);
        let effects = r.on_item_fetched(
            ticket,
            Ok(item(vec![link(1, "https://a.example/embed/1", false), link(2, "https://cdn.example.com/b.mp4", true)], false)),
            now,
        );
        assert_eq!(effects[0], Effect::Release { link_id: 1 });
        assert_eq!(r.state().selected_link, Some(2));
        assert_eq!(attach(&effects).unwrap().plan, SurfacePlan::NativeVideo);
    }

    #[test]
    fn test_refetch_keeps_valid_selection() {
        let now = Instant::now();
        let (mut r, _) = loaded(
            vec![link(1, "https://a.example/embed/1", true), link(2, "https://b.example/embed/2", true)],
            now,
        );
        r.select_link(2, now);
        let ticket = fetch_ticket(&r.validate());
        let effects = r.on_item_fetched(
            ticket,
            Ok(item(vec![link(1, "https://a.example/embed/1", true), link(2, "https://b.example/embed/2", true)], false)),
            now,
        );
        assert!(effects.is_empty());
        assert_eq!(r.state().selected_link, Some(2));
    }

    #[test]
    fn test_next_deadline_is_earliest_timer() {
        let now = Instant::now();
        let (mut r, _) = loaded(vec![link(1, "https://a.example/embed/1", true)], now);
        assert_eq!(r.next_deadline(), Some(now + Duration::from_secs(20)));
        r.request_refresh(now);
        assert_eq!(r.next_deadline(), Some(now + Duration::from_secs(3)));
    }

    #[test]
    fn test_reopened_view_ignores_stale_refresh_ack() {
        let now = Instant::now();
        let (mut old, _) = loaded(vec![], now);
        let old_cycle = refresh_cycle(&old.request_refresh(now));
        old.teardown();

        let (mut new, _) = loaded(vec![], now);
        let new_cycle = refresh_cycle(&new.request_refresh(now));
        assert_ne!(old_cycle, new_cycle);

        let effects = new.on_refresh_ack(old_cycle, Err(Error::Transport("reset".to_string())));
        assert!(effects.is_empty());
        assert!(new.state().refreshing);
        assert_eq!(new.phase(), RefreshPhase::Refreshing);
    }

    #[test]
    fn test_reopened_view_ignores_stale_load_result() {
        let now = Instant::now();
        let mut old = Resolver::new(ITEM, ResolverSettings::default());
        let old_ticket = fetch_ticket(&old.start());
        old.teardown();

        let mut new = Resolver::new(ITEM, ResolverSettings::default());
        let new_ticket = fetch_ticket(&new.start());
        assert_ne!(old_ticket, new_ticket);

        let effects = new.on_item_fetched(old_ticket, Err(Error::http(404, "Not found.")), now);
        assert!(effects.is_empty());
        assert!(new.load_error().is_none());
        assert!(new.is_loading());

        new.on_item_fetched(new_ticket, Ok(item(vec![link(1, "https://a.example/embed/1", true)], false)), now);
        assert_eq!(new.state().selected_link, Some(1));
    }

    #[test]
    fn test_reopened_view_ignores_stale_surface_signal() {
        let now = Instant::now();
        let links = vec![link(1, "https://a.example/embed/1", true)];
        let (mut old, old_effects) = loaded(links.clone(), now);
        let old_req = attach(&old_effects).unwrap();
        old.teardown();

        let (mut new, new_effects) = loaded(links, now);
        let new_req = attach(&new_effects).unwrap();
        assert_ne!(old_req.epoch, new_req.epoch);

        new.on_surface_signal(1, old_req.epoch, SurfaceSignal::Error);
        assert!(!new.state().playback_error);
        assert!(new.state().loading_video);
    }
}
