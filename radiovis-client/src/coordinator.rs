//! Ties the resolver, the session client and the fetch engine together.
//!
//! The coordinator owns one [`NameResolver`], one [`FetchEngine`] and at
//! most one [`SessionClient`]. Session events are relayed unchanged to every
//! registered [`Observer`]; SHOW events additionally queue an image fetch,
//! and fetched images are handed to observers as raw bytes.
//!
//! Observer callbacks run on the session or fetch worker thread. They must
//! not call [`Coordinator::connect`], [`Coordinator::disconnect`] or
//! [`Coordinator::shutdown`], which join those threads.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info};
use parking_lot::Mutex;

use radiovis_protocol::{
    FetchRequest, ProxySettings, ServiceDescriptor, ServiceEndpoint, SessionEvent,
    StationIdentity,
};

use crate::client::{FetchEngine, FetchEvent, SessionClient, SessionConfig, SessionState};
use crate::config::CoordinatorConfig;
use crate::resolver::{DnsBackend, HickoryBackend, NameResolver};

/// Receives relayed events.
pub trait Observer: Send + Sync {
    /// Every session event, in wire order.
    fn on_session_event(&self, event: &SessionEvent);

    /// A fetched image with a non-empty body.
    fn on_image(&self, _url: &str, _data: &Bytes) {}

    /// Every fetch outcome, including failures and discards.
    fn on_fetch_event(&self, _event: &FetchEvent) {}
}

/// Handle returned by [`Coordinator::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Observers {
    list: Mutex<Vec<(ObserverId, Arc<dyn Observer>)>>,
    next_id: AtomicU64,
}

impl Observers {
    fn add(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.list.lock().push((id, observer));
        id
    }

    fn remove(&self, id: ObserverId) -> bool {
        let mut list = self.list.lock();
        let before = list.len();
        list.retain(|(entry, _)| *entry != id);
        list.len() != before
    }

    /// Call `f` on each observer in registration order.
    fn notify<F>(&self, f: F)
    where
        F: Fn(&dyn Observer),
    {
        let snapshot: Vec<Arc<dyn Observer>> = self
            .list
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
                error!("Observer panicked while handling an event");
            }
        }
    }
}

struct ImageRequests {
    fetch: FetchEngine,
    proxy: Option<Arc<ProxySettings>>,
    use_http_proxy: AtomicBool,
}

impl ImageRequests {
    fn request(&self, url: &str, use_proxy: bool) {
        let proxy = if use_proxy { self.proxy.clone() } else { None };
        if use_proxy && proxy.is_none() {
            debug!("No proxy configured, fetching {} directly", url);
        }
        self.fetch.request(FetchRequest::new(url).with_proxy(proxy));
    }
}

/// Callback context of one session.
struct Relay {
    generation: u64,
    current: Arc<AtomicU64>,
    observers: Arc<Observers>,
    images: Arc<ImageRequests>,
}

impl Relay {
    fn handle(&self, event: SessionEvent) {
        if self.current.load(Ordering::SeqCst) != self.generation {
            debug!("Dropping event from stale session {}", self.generation);
            return;
        }

        self.observers.notify(|observer| observer.on_session_event(&event));

        if let SessionEvent::ShowReceived(show) = &event {
            if !show.image_url.is_empty() {
                let use_proxy = self.images.use_http_proxy.load(Ordering::SeqCst);
                self.images.request(&show.image_url, use_proxy);
            }
        }
    }
}

fn relay_fetch_event(observers: &Observers, event: FetchEvent) {
    observers.notify(|observer| observer.on_fetch_event(&event));

    match &event {
        FetchEvent::Completed { url, data } if !data.is_empty() => {
            observers.notify(|observer| observer.on_image(url, data));
        }
        FetchEvent::Completed { url, .. } => debug!("Empty body for {}", url),
        FetchEvent::Failed { .. } | FetchEvent::Discarded { .. } => {}
    }
}

/// Session orchestration for a single station at a time.
pub struct Coordinator<B: DnsBackend = HickoryBackend> {
    resolver: NameResolver<B>,
    services: Vec<ServiceDescriptor>,
    connect_timeout: Duration,
    login: Option<String>,
    passcode: Option<String>,
    proxy: Option<Arc<ProxySettings>>,
    observers: Arc<Observers>,
    images: Arc<ImageRequests>,
    session: Mutex<Option<SessionClient>>,
    connect_lock: Mutex<()>,
    generation: Arc<AtomicU64>,
}

impl Coordinator<HickoryBackend> {
    /// Coordinator over the system DNS configuration.
    pub fn new(config: CoordinatorConfig) -> io::Result<Self> {
        Self::with_resolver(NameResolver::system()?, config)
    }
}

impl<B: DnsBackend> Coordinator<B> {
    /// Coordinator over `resolver`. Starts the fetch worker.
    pub fn with_resolver(resolver: NameResolver<B>, config: CoordinatorConfig) -> io::Result<Self> {
        let observers = Arc::new(Observers::default());

        let fetch_observers = Arc::clone(&observers);
        let fetch = FetchEngine::start(
            config.fetch,
            Arc::new(move |event| relay_fetch_event(&fetch_observers, event)),
        )?;

        let proxy = config.proxy.map(Arc::new);
        if let Some(proxy) = &proxy {
            info!("Proxy available: {}", proxy);
        }

        Ok(Self {
            resolver,
            services: config.services,
            connect_timeout: config.connect_timeout,
            login: config.login,
            passcode: config.passcode,
            proxy: proxy.clone(),
            observers,
            images: Arc::new(ImageRequests {
                fetch,
                proxy,
                use_http_proxy: AtomicBool::new(config.use_http_proxy),
            }),
            session: Mutex::new(None),
            connect_lock: Mutex::new(()),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn resolver(&self) -> &NameResolver<B> {
        &self.resolver
    }

    pub fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_deref()
    }

    /// Canonical name of `station` and the endpoints of every configured
    /// service. `(None, [])` when the station has no canonical name.
    pub fn resolve(&self, station: &StationIdentity) -> (Option<String>, Vec<ServiceEndpoint>) {
        let hostname = station.hostname();
        info!("Resolving {} ({})", station.name(), hostname);

        let Some(canonical) = self.resolver.get_canonical_name(&hostname) else {
            info!("No canonical name for {}", hostname);
            return (None, Vec::new());
        };

        let endpoints = self
            .services
            .iter()
            .flat_map(|service| {
                self.resolver
                    .get_services(&service.record, &canonical, &service.name)
            })
            .collect();

        (Some(canonical), endpoints)
    }

    /// Replace any current session with one to `endpoint` on the station's
    /// text and image topics.
    pub fn connect(
        &self,
        endpoint: &ServiceEndpoint,
        station: &StationIdentity,
        use_proxy: bool,
    ) -> io::Result<()> {
        info!("Connecting to {} for {}", endpoint, station);
        self.start_session(
            &endpoint.target,
            endpoint.port,
            Some(station.text_topic()),
            Some(station.image_topic()),
            use_proxy,
        )
    }

    /// Replace any current session with one to `host:port` on explicit topics.
    pub fn connect_direct(
        &self,
        host: &str,
        port: u16,
        text_topic: Option<&str>,
        image_topic: Option<&str>,
        use_proxy: bool,
    ) -> io::Result<()> {
        info!("Connecting directly to {}:{}", host, port);
        self.start_session(
            host,
            port,
            text_topic.map(str::to_string),
            image_topic.map(str::to_string),
            use_proxy,
        )
    }

    fn start_session(
        &self,
        host: &str,
        port: u16,
        text_topic: Option<String>,
        image_topic: Option<String>,
        use_proxy: bool,
    ) -> io::Result<()> {
        let _serial = self.connect_lock.lock();

        // The previous session delivers its last events before the
        // generation moves on.
        self.disconnect();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let relay = Relay {
            generation,
            current: Arc::clone(&self.generation),
            observers: Arc::clone(&self.observers),
            images: Arc::clone(&self.images),
        };

        let config = SessionConfig {
            host: host.to_string(),
            port,
            proxy: if use_proxy { self.proxy.clone() } else { None },
            text_topic,
            image_topic,
            login: self.login.clone(),
            passcode: self.passcode.clone(),
            connect_timeout: self.connect_timeout,
        };

        let client = SessionClient::start(config, Arc::new(move |event| relay.handle(event)))?;
        *self.session.lock() = Some(client);
        Ok(())
    }

    /// Close the current session, if any, and wait for it to finish.
    pub fn disconnect(&self) {
        let previous = self.session.lock().take();
        if let Some(previous) = previous {
            info!("Closing session with {}:{}", previous.config().host, previous.config().port);
            previous.stop();
        }
    }

    /// Queue an image fetch, through the proxy only when `use_proxy`.
    pub fn request_image(&self, url: &str, use_proxy: bool) {
        self.images.request(url, use_proxy);
    }

    /// Route SHOW-triggered fetches through the proxy.
    pub fn enable_http_proxy(&self, enabled: bool) {
        self.images.use_http_proxy.store(enabled, Ordering::SeqCst);
    }

    pub fn http_proxy_enabled(&self) -> bool {
        self.images.use_http_proxy.load(Ordering::SeqCst)
    }

    pub fn session_state(&self) -> SessionState {
        self.session
            .lock()
            .as_ref()
            .map(SessionClient::state)
            .unwrap_or(SessionState::Disconnected)
    }

    /// Publish TEXT on the current session.
    pub fn send_text(&self, topic: &str, text: &str) -> bool {
        match self.session.lock().as_ref() {
            Some(session) => session.send_text(topic, text),
            None => false,
        }
    }

    /// Publish SHOW on the current session.
    pub fn send_show(
        &self,
        topic: &str,
        image_url: &str,
        link: Option<&str>,
        trigger_time: Option<&str>,
    ) -> bool {
        match self.session.lock().as_ref() {
            Some(session) => session.send_show(topic, image_url, link, trigger_time),
            None => false,
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn Observer>) -> ObserverId {
        self.observers.add(observer)
    }

    /// Returns false if `id` was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Stop the session and the fetch worker.
    pub fn shutdown(&self) {
        self.disconnect();
        self.images.fetch.stop();
    }
}

impl<B: DnsBackend> Drop for Coordinator<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::resolver::mock::{srv, MockBackend};
    use crate::resolver::LocalAliases;
    use crate::testing::{init_logging, message, HttpServer, StompScript, StompServer, WAIT};
    use radiovis_protocol::Show;

    const TEXT_TOPIC: &str = "/topic/drm/abcdef/text";
    const IMAGE_TOPIC: &str = "/topic/drm/abcdef/image";

    #[derive(Debug, PartialEq)]
    enum Seen {
        Session(SessionEvent),
        Image(String, Bytes),
    }

    struct Recorder(Mutex<mpsc::Sender<Seen>>);

    impl Observer for Recorder {
        fn on_session_event(&self, event: &SessionEvent) {
            if !matches!(event, SessionEvent::RawFrame(_)) {
                let _ = self.0.lock().send(Seen::Session(event.clone()));
            }
        }

        fn on_image(&self, url: &str, data: &Bytes) {
            let _ = self.0.lock().send(Seen::Image(url.to_string(), data.clone()));
        }
    }

    struct Panicker;

    impl Observer for Panicker {
        fn on_session_event(&self, _event: &SessionEvent) {
            panic!("observer failure");
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::Receiver<Seen>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Recorder(Mutex::new(tx))), rx)
    }

    fn coordinator(backend: MockBackend, config: CoordinatorConfig) -> Coordinator<MockBackend> {
        let resolver = NameResolver::with_backend(backend, LocalAliases::from_names(["localhost"]));
        Coordinator::with_resolver(resolver, config).unwrap()
    }

    fn station() -> StationIdentity {
        StationIdentity::drm("DRM Station", "abcdef").unwrap()
    }

    /// Receive until `done` matches, returning everything seen.
    fn until(rx: &mpsc::Receiver<Seen>, done: impl Fn(&[Seen]) -> bool) -> Vec<Seen> {
        let mut seen = Vec::new();
        while !done(&seen) {
            seen.push(rx.recv_timeout(WAIT).unwrap());
        }
        seen
    }

    #[test]
    fn test_resolve_over_configured_services() {
        let mut backend = MockBackend::default();
        backend.cname.insert(
            "abcdef.drm.radiodns.org".to_string(),
            Ok(vec!["rdns.example.com.".to_string()]),
        );
        backend.srv.insert(
            "_radiovis._tcp.rdns.example.com".to_string(),
            Ok(vec![srv("vis.example.com.", 61613, 0, 100)]),
        );
        backend.srv.insert(
            "_radioepg._tcp.rdns.example.com".to_string(),
            Ok(vec![srv("epg.example.com.", 80, 0, 100)]),
        );
        let config = CoordinatorConfig {
            services: vec![
                ServiceDescriptor::radiovis(),
                ServiceDescriptor::new("RadioEPG", "_radioepg._tcp"),
                ServiceDescriptor::new("RadioTAG", "_radiotag._tcp"),
            ],
            ..Default::default()
        };
        let coordinator = coordinator(backend, config);

        let (canonical, endpoints) = coordinator.resolve(&station());
        assert_eq!(canonical.as_deref(), Some("rdns.example.com"));
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].name, "RadioVIS");
        assert_eq!(endpoints[0].target, "vis.example.com");
        assert_eq!(endpoints[1].name, "RadioEPG");
        assert_eq!(endpoints[1].port, 80);
    }

    #[test]
    fn test_resolve_without_cname() {
        let coordinator = coordinator(MockBackend::default(), CoordinatorConfig::default());
        assert_eq!(coordinator.resolve(&station()), (None, Vec::new()));
        // No SRV query after a failed CNAME lookup.
        assert_eq!(coordinator.resolver().backend().queries(), 1);
    }

    #[test]
    fn test_relays_events_and_fetches_show_image() {
        init_logging();
        let http = HttpServer::spawn(1, None);
        let image_url = http.url("/slides/1.png");
        let stomp = StompServer::spawn(StompScript {
            subscriptions: 2,
            frames: vec![
                message(TEXT_TOPIC, "TEXT Now playing"),
                message(IMAGE_TOPIC, &format!("SHOW {}", image_url)),
            ],
            ..Default::default()
        });

        let coordinator = coordinator(MockBackend::default(), CoordinatorConfig::default());
        let (observer, rx) = recorder();
        coordinator.add_observer(observer);
        coordinator
            .connect_direct("127.0.0.1", stomp.port, Some(TEXT_TOPIC), Some(IMAGE_TOPIC), false)
            .unwrap();

        let seen = until(&rx, |seen| {
            seen.iter().any(|s| matches!(s, Seen::Image(..)))
                && seen.contains(&Seen::Session(SessionEvent::Disconnected))
        });

        let session: Vec<_> = seen
            .iter()
            .filter(|s| matches!(s, Seen::Session(_)))
            .collect();
        assert_eq!(
            session,
            vec![
                &Seen::Session(SessionEvent::Connected),
                &Seen::Session(SessionEvent::TextReceived("Now playing".to_string())),
                &Seen::Session(SessionEvent::ShowReceived(Show {
                    image_url: image_url.clone(),
                    link_url: None,
                    trigger_time: None,
                })),
                &Seen::Session(SessionEvent::Disconnected),
            ]
        );
        assert!(seen.contains(&Seen::Image(
            image_url,
            Bytes::from_static(b"/slides/1.png")
        )));

        stomp.finish();
        assert_eq!(http.finish(), 0);
    }

    #[test]
    fn test_panicking_observer_does_not_block_others() {
        let stomp = StompServer::spawn(StompScript {
            subscriptions: 1,
            frames: vec![message(TEXT_TOPIC, "TEXT still delivered")],
            ..Default::default()
        });

        let coordinator = coordinator(MockBackend::default(), CoordinatorConfig::default());
        coordinator.add_observer(Arc::new(Panicker));
        let (observer, rx) = recorder();
        coordinator.add_observer(observer);
        coordinator
            .connect_direct("127.0.0.1", stomp.port, Some(TEXT_TOPIC), None, false)
            .unwrap();

        let seen = until(&rx, |seen| {
            seen.contains(&Seen::Session(SessionEvent::Disconnected))
        });
        assert!(seen.contains(&Seen::Session(SessionEvent::TextReceived(
            "still delivered".to_string()
        ))));
        stomp.finish();
    }

    #[test]
    fn test_reconnect_closes_previous_session_first() {
        let first = StompServer::spawn(StompScript {
            subscriptions: 2,
            linger: true,
            ..Default::default()
        });
        let second = StompServer::spawn(StompScript {
            subscriptions: 2,
            linger: true,
            ..Default::default()
        });

        let coordinator = coordinator(MockBackend::default(), CoordinatorConfig::default());
        let (observer, rx) = recorder();
        coordinator.add_observer(observer);

        coordinator
            .connect_direct("127.0.0.1", first.port, Some(TEXT_TOPIC), Some(IMAGE_TOPIC), false)
            .unwrap();
        until(&rx, |seen| !seen.is_empty());

        coordinator
            .connect_direct("127.0.0.1", second.port, Some(TEXT_TOPIC), Some(IMAGE_TOPIC), false)
            .unwrap();
        let seen = until(&rx, |seen| seen.len() == 2);
        assert_eq!(
            seen,
            vec![
                Seen::Session(SessionEvent::Disconnected),
                Seen::Session(SessionEvent::Connected),
            ]
        );

        let received = first.finish();
        assert_eq!(
            received.last().map(|f| f.command),
            Some(radiovis_protocol::Command::Disconnect)
        );

        coordinator.shutdown();
        second.finish();
        assert_eq!(coordinator.session_state(), SessionState::Disconnected);
    }

    #[test]
    fn test_stale_generation_events_are_dropped() {
        let coordinator = coordinator(MockBackend::default(), CoordinatorConfig::default());
        let (observer, rx) = recorder();
        coordinator.add_observer(observer);
        coordinator.generation.store(2, Ordering::SeqCst);

        let relay = |generation| Relay {
            generation,
            current: Arc::clone(&coordinator.generation),
            observers: Arc::clone(&coordinator.observers),
            images: Arc::clone(&coordinator.images),
        };

        relay(1).handle(SessionEvent::TextReceived("old".to_string()));
        relay(2).handle(SessionEvent::TextReceived("new".to_string()));

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            Seen::Session(SessionEvent::TextReceived("new".to_string()))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_request_image_and_remove_observer() {
        let http = HttpServer::spawn(1, None);
        let coordinator = coordinator(MockBackend::default(), CoordinatorConfig::default());
        let (observer, rx) = recorder();
        let id = coordinator.add_observer(observer);

        coordinator.request_image(&http.url("/a.png"), true);
        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            Seen::Image(http.url("/a.png"), Bytes::from_static(b"/a.png"))
        );

        assert!(coordinator.remove_observer(id));
        assert!(!coordinator.remove_observer(id));
        http.finish();
    }

    #[test]
    fn test_proxy_switch() {
        let config = CoordinatorConfig {
            proxy: Some(ProxySettings::http("cache", 3128)),
            ..Default::default()
        };
        let coordinator = coordinator(MockBackend::default(), config);

        assert!(!coordinator.http_proxy_enabled());
        coordinator.enable_http_proxy(true);
        assert!(coordinator.http_proxy_enabled());
        assert_eq!(coordinator.proxy(), Some(&ProxySettings::http("cache", 3128)));
        assert!(!coordinator.send_text(TEXT_TOPIC, "no session"));
    }
}
