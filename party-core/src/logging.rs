//! Tracing setup

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

/// Install the global fmt subscriber (first call wins)
///
/// `RUST_LOG` is honoured; the directives below are layered on top so the
/// HTTP stack stays quiet unless asked for explicitly.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::from_default_env()
            .add_directive("party_core=debug".parse().expect("static directive"))
            .add_directive("libp2p_mdns=info".parse().expect("static directive"))
            .add_directive("libp2p_gossipsub=info".parse().expect("static directive"))
            .add_directive("hyper_util=off".parse().expect("static directive"))
            .add_directive("reqwest=off".parse().expect("static directive"))
            .add_directive("hyper=off".parse().expect("static directive"));

        // try_init so an embedding application's subscriber is left alone
        let _ = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
