//! Endpoint composition root.
//!
//! This module is the single place where all service modules are
//! instantiated and attached to the shared listener router. Composition is
//! split into a pure, fallible build step and the side-effecting serve
//! step (in [`server`](crate::server)), so construction failures can be
//! tested without ever opening a socket.
//!
//! Construction order is fixed and doubles as the teardown order. If any
//! service constructor fails, every already-constructed handle is
//! deinitialized before the error propagates - composition is atomic and
//! never leaks a partially built service set.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::constants::SERVICE_ID;
use crate::context::PlatformContext;
use crate::error::HarnessResult;
use crate::probe::{probe_audio_role, AudioRole};
use crate::services::{
    A2dpSink, A2dpSource, Avrcp, Diagnostics, Gatt, Hfp, Hid, Host, L2cap, MediaPlayer, Rfcomm,
    RpcService, Security,
};

/// One deferred service constructor in the composition sequence.
type ServiceBuilder = Box<dyn FnOnce() -> HarnessResult<Arc<dyn RpcService>>>;

/// A fully registered endpoint that has not yet bound its port.
///
/// Owns every service handle for the process lifetime. Returned by
/// [`compose`]; consumed by [`serve`](ComposedServer::serve).
pub struct ComposedServer {
    pub(crate) router: Router,
    pub(crate) handles: Vec<Arc<dyn RpcService>>,
}

impl ComposedServer {
    /// Names of every registered service, in registration order.
    pub fn service_names(&self) -> Vec<&'static str> {
        self.handles.iter().map(|h| h.name()).collect()
    }
}

/// Deinitializes already-constructed handles in reverse construction
/// order. Rollback failures are logged, never escalated.
fn rollback(handles: &[Arc<dyn RpcService>]) {
    for handle in handles.iter().rev() {
        if let Err(te) = handle.deinit() {
            log::warn!("[Compose] Rollback teardown failed: {}", te);
        }
    }
}

/// Runs a sequence of service constructors with transactional rollback.
///
/// On the first failure, every already-constructed handle is deinitialized
/// and the originating error is returned.
fn build_all(builders: Vec<ServiceBuilder>) -> HarnessResult<Vec<Arc<dyn RpcService>>> {
    let mut handles: Vec<Arc<dyn RpcService>> = Vec::with_capacity(builders.len());
    for builder in builders {
        match builder() {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                log::error!("[Compose] Service construction failed, rolling back: {}", e);
                rollback(&handles);
                return Err(e);
            }
        }
    }
    Ok(handles)
}

/// Builds the full service set: the fixed services plus the one audio
/// variant selected by the capability probe.
///
/// # Errors
///
/// Fails if the adapter cannot be probed or any service constructor
/// fails; in the latter case already-constructed services are rolled back.
pub fn build_services(ctx: &Arc<PlatformContext>) -> HarnessResult<Vec<Arc<dyn RpcService>>> {
    let role = probe_audio_role(ctx.adapter())?;

    let mut builders: Vec<ServiceBuilder> = Vec::new();
    macro_rules! fixed {
        ($ty:ty) => {{
            let ctx = Arc::clone(ctx);
            builders.push(Box::new(move || {
                <$ty>::new(ctx).map(|s| Arc::new(s) as Arc<dyn RpcService>)
            }));
        }};
    }

    fixed!(Host);
    fixed!(Avrcp);
    fixed!(Gatt);
    fixed!(Hfp);
    fixed!(Hid);
    fixed!(L2cap);
    fixed!(MediaPlayer);
    fixed!(Rfcomm);
    fixed!(Security);

    // Exactly one audio service exists per process; the role was resolved
    // once above and is never re-evaluated.
    {
        let ctx = Arc::clone(ctx);
        builders.push(Box::new(move || match role {
            AudioRole::Source => {
                A2dpSource::new(ctx).map(|s| Arc::new(s) as Arc<dyn RpcService>)
            }
            AudioRole::Sink => A2dpSink::new(ctx).map(|s| Arc::new(s) as Arc<dyn RpcService>),
        }));
    }

    let mut handles = build_all(builders)?;

    // Diagnostics reports on the composed set, so it is constructed last
    // from the names of everything that precedes it.
    let mut names: Vec<&'static str> = handles.iter().map(|h| h.name()).collect();
    names.push("Diagnostics");
    match Diagnostics::new(names) {
        Ok(diag) => handles.push(Arc::new(diag)),
        Err(e) => {
            rollback(&handles);
            return Err(e);
        }
    }

    Ok(handles)
}

/// Registers a set of service handles behind one router.
///
/// Pure: no socket is touched. Registration is commutative - each service
/// owns a disjoint route prefix - so the fold order is insignificant.
pub fn compose_with(handles: Vec<Arc<dyn RpcService>>) -> ComposedServer {
    let names: Vec<String> = handles.iter().map(|h| h.name().to_string()).collect();
    log::info!("[Compose] Registering {} services: {:?}", names.len(), names);

    let health_body = json!({
        "status": "ok",
        "service": SERVICE_ID,
        "services": names,
    });
    let mut app = Router::new().route(
        "/health",
        get(move || {
            let body = health_body.clone();
            async move { Json(body) }
        }),
    );

    for handle in &handles {
        app = handle.register(app);
    }
    let app = app.layer(TraceLayer::new_for_http());

    ComposedServer {
        router: app,
        handles,
    }
}

/// Composes the endpoint: probe, build, register.
///
/// The returned value owns the service graph but has not bound a port;
/// call [`ComposedServer::serve`] to start accepting RPC calls.
pub fn compose(ctx: &Arc<PlatformContext>) -> HarnessResult<ComposedServer> {
    Ok(compose_with(build_services(ctx)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Profile, StaticAdapter};
    use crate::error::HarnessError;
    use crate::services::TeardownError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context_with(profiles: impl IntoIterator<Item = Profile>) -> Arc<PlatformContext> {
        Arc::new(PlatformContext::new(StaticAdapter::arc(
            "AA:BB:CC:DD:EE:FF",
            "harness-0",
            profiles,
        )))
    }

    #[test]
    fn source_capable_adapter_gets_source_service_only() {
        let ctx = context_with([Profile::A2dpSource]);
        let server = compose(&ctx).unwrap();
        let names = server.service_names();
        assert!(names.contains(&"A2dpSource"));
        assert!(!names.contains(&"A2dpSink"));
    }

    #[test]
    fn sink_only_adapter_gets_sink_service_only() {
        let ctx = context_with([Profile::A2dpSink]);
        let server = compose(&ctx).unwrap();
        let names = server.service_names();
        assert!(names.contains(&"A2dpSink"));
        assert!(!names.contains(&"A2dpSource"));
    }

    #[test]
    fn exactly_one_audio_variant_is_registered() {
        for profiles in [vec![Profile::A2dpSource], vec![Profile::A2dpSink], vec![]] {
            let ctx = context_with(profiles);
            let server = compose(&ctx).unwrap();
            let audio = server
                .service_names()
                .iter()
                .filter(|n| n.starts_with("A2dp"))
                .count();
            assert_eq!(audio, 1);
        }
    }

    #[test]
    fn fixed_set_is_complete_and_ordered() {
        let ctx = context_with([Profile::A2dpSource]);
        let server = compose(&ctx).unwrap();
        assert_eq!(
            server.service_names(),
            vec![
                "Host",
                "Avrcp",
                "Gatt",
                "Hfp",
                "Hid",
                "L2cap",
                "MediaPlayer",
                "Rfcomm",
                "Security",
                "A2dpSource",
                "Diagnostics",
            ]
        );
    }

    #[test]
    fn probe_failure_aborts_composition() {
        use crate::adapter::{Adapter, AdapterError};
        use std::collections::HashSet;

        struct BrokenAdapter;
        impl Adapter for BrokenAdapter {
            fn address(&self) -> String {
                "00:00:00:00:00:00".into()
            }
            fn name(&self) -> String {
                "broken".into()
            }
            fn supported_profiles(&self) -> Result<HashSet<Profile>, AdapterError> {
                Err(AdapterError::Unavailable("no adapter".into()))
            }
        }

        let ctx = Arc::new(PlatformContext::new(Arc::new(BrokenAdapter)));
        assert!(matches!(compose(&ctx), Err(HarnessError::Adapter(_))));
    }

    /// Construction-order probe used to verify rollback behavior.
    struct CountingService {
        name: &'static str,
        deinits: Arc<AtomicUsize>,
    }

    impl RpcService for CountingService {
        fn name(&self) -> &'static str {
            self.name
        }
        fn register(&self, app: Router) -> Router {
            app
        }
        fn deinit(&self) -> Result<(), TeardownError> {
            self.deinits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn failed_constructor_rolls_back_earlier_services() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let builders: Vec<ServiceBuilder> = vec![
            {
                let deinits = Arc::clone(&first);
                Box::new(move || {
                    Ok(Arc::new(CountingService { name: "First", deinits }) as Arc<dyn RpcService>)
                })
            },
            {
                let deinits = Arc::clone(&second);
                Box::new(move || {
                    Ok(Arc::new(CountingService { name: "Second", deinits })
                        as Arc<dyn RpcService>)
                })
            },
            Box::new(|| {
                Err(HarnessError::ServiceInit {
                    service: "Third",
                    reason: "simulated".into(),
                })
            }),
        ];

        let result = build_all(builders);
        assert!(matches!(
            result,
            Err(HarnessError::ServiceInit { service: "Third", .. })
        ));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
