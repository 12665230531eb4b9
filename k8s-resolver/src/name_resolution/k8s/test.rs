/*
 *
 * Copyright 2025 gRPC authors.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to
 * deal in the Software without restriction, including without limitation the
 * rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
 * sell copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
 * IN THE SOFTWARE.
 *
 */

use std::time::Duration;

use tokio::time::{self, Instant};

use super::K8sResolverBuilder;
use crate::{
    discovery::{
        WatchCache, WatchEventType, WatchPhase,
        test_utils::{Call, FakeClient, event, slice, wait_for_phase},
    },
    name_resolution::{
        Address, Endpoint, LbPolicy, ResolverBuilder,
        test_utils::{channel_controller, resolver_options},
    },
    options::{self, ChannelOptions},
};

const PACING: Duration = Duration::from_millis(250);

fn builder() -> (
    K8sResolverBuilder,
    WatchCache,
    std::sync::Arc<FakeClient>,
    tokio::sync::mpsc::UnboundedReceiver<Call>,
) {
    let (client, calls) = FakeClient::new();
    let cache = WatchCache::new(client.clone());
    (K8sResolverBuilder::new(cache.clone()), cache, client, calls)
}

#[test]
pub(crate) fn builder_scheme_and_authority() {
    let (builder, cache, _client, _calls) = builder();
    assert_eq!(builder.scheme(), "k8s");
    let target = "k8s:///svc-c".parse().unwrap();
    assert_eq!(builder.default_authority(&target), "svc-c");
    assert!(builder.is_valid_uri(&target));
    assert!(!builder.is_valid_uri(&"k8s:///".parse().unwrap()));
    assert_eq!(cache.watch_phase(), WatchPhase::Stopped);
}

#[tokio::test(start_paused = true)]
pub(crate) async fn resolves_watched_endpoints() {
    let (builder, cache, client, mut calls) = builder();
    let target = &"k8s:///svc-c".parse().unwrap();
    let (opts, mut work_rx) = resolver_options(ChannelOptions::new());
    let mut resolver = builder.build(target, opts);
    assert_eq!(cache.watch_phase(), WatchPhase::Stopped);

    resolver.resolve_now();
    assert_eq!(calls.recv().await, Some(Call::List));
    assert!(matches!(calls.recv().await, Some(Call::Watch(_))));
    wait_for_phase(&cache, WatchPhase::Running).await;

    client.send(event(
        WatchEventType::Added,
        slice("r1", "svc-c", &["10.0.0.1"], &[("grpc", 50051)]),
    ));
    work_rx.recv().await.unwrap();
    let (mut channel_controller, mut update_rx) = channel_controller();
    resolver.work(&mut channel_controller);
    let update = update_rx.recv().await.unwrap();
    assert_eq!(
        update.endpoints.unwrap(),
        vec![Endpoint::single(Address::tcp("10.0.0.1", 50051))]
    );
    let service_config = update.service_config.unwrap().unwrap();
    assert_eq!(service_config.load_balancing_policy, LbPolicy::RoundRobin);

    client.send(event(
        WatchEventType::Deleted,
        slice("r1", "svc-c", &["10.0.0.1"], &[("grpc", 50051)]),
    ));
    work_rx.recv().await.unwrap();
    resolver.work(&mut channel_controller);
    let update = update_rx.recv().await.unwrap();
    let status = update.endpoints.unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unavailable);
    assert_eq!(
        status.message(),
        "No endpoints available for target k8s:///svc-c"
    );
}

#[tokio::test(start_paused = true)]
pub(crate) async fn no_update_before_watch_data() {
    let (builder, _cache, client, mut calls) = builder();
    let target = &"k8s:///svc-c".parse().unwrap();
    let (opts, mut work_rx) = resolver_options(ChannelOptions::new());
    let mut resolver = builder.build(target, opts);

    for _ in 0..10 {
        resolver.resolve_now();
    }
    assert_eq!(calls.recv().await, Some(Call::List));
    assert!(matches!(calls.recv().await, Some(Call::Watch(_))));
    client.send(event(
        WatchEventType::Added,
        slice("r1", "svc-other", &["10.0.0.1"], &[("grpc", 50051)]),
    ));
    resolver.resolve_now();

    let work = time::timeout(Duration::from_secs(1), work_rx.recv()).await;
    assert!(work.is_err());
    let (mut channel_controller, mut update_rx) = channel_controller();
    resolver.work(&mut channel_controller);
    assert!(update_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
pub(crate) async fn resolve_now_is_paced_and_changes_are_not() {
    let (builder, cache, client, mut calls) = builder();
    let target = &"k8s:///svc-c".parse().unwrap();
    let (opts, mut work_rx) = resolver_options(ChannelOptions::new());
    let mut resolver = builder.build(target, opts);
    let (mut channel_controller, mut update_rx) = channel_controller();

    resolver.resolve_now();
    assert_eq!(calls.recv().await, Some(Call::List));
    wait_for_phase(&cache, WatchPhase::Running).await;
    client.send(event(
        WatchEventType::Added,
        slice("r1", "svc-c", &["10.0.0.1"], &[("grpc", 50051)]),
    ));
    work_rx.recv().await.unwrap();
    let notified = Instant::now();
    resolver.work(&mut channel_controller);
    update_rx.recv().await.unwrap();

    for _ in 0..5 {
        resolver.resolve_now();
    }
    work_rx.recv().await.unwrap();
    assert!(notified.elapsed() >= PACING);
    resolver.work(&mut channel_controller);
    assert!(update_rx.recv().await.unwrap().endpoints.is_ok());

    // A change cancels the pending paced notification and is delivered at
    // once.
    let requested = Instant::now();
    resolver.resolve_now();
    client.send(event(
        WatchEventType::Modified,
        slice("r1", "svc-c", &["10.0.0.2"], &[("grpc", 50051)]),
    ));
    work_rx.recv().await.unwrap();
    assert!(requested.elapsed() < PACING);
    resolver.work(&mut channel_controller);
    assert_eq!(
        update_rx.recv().await.unwrap().endpoints.unwrap(),
        vec![Endpoint::single(Address::tcp("10.0.0.2", 50051))]
    );
    let extra = time::timeout(Duration::from_secs(1), work_rx.recv()).await;
    assert!(extra.is_err());
}

#[tokio::test(start_paused = true)]
pub(crate) async fn selects_configured_port_name() {
    let (builder, cache, client, mut calls) = builder();
    let target = &"k8s:///svc-c".parse().unwrap();
    let (opts, mut work_rx) =
        resolver_options(ChannelOptions::new().with(options::PORT_NAME, "http"));
    let mut resolver = builder.build(target, opts);

    resolver.resolve_now();
    assert_eq!(calls.recv().await, Some(Call::List));
    wait_for_phase(&cache, WatchPhase::Running).await;
    client.send(event(
        WatchEventType::Added,
        slice("r1", "svc-c", &["10.0.0.1"], &[("grpc", 50051), ("http", 8080)]),
    ));
    work_rx.recv().await.unwrap();
    let (mut channel_controller, mut update_rx) = channel_controller();
    resolver.work(&mut channel_controller);
    assert_eq!(
        update_rx.recv().await.unwrap().endpoints.unwrap(),
        vec![Endpoint::single(Address::tcp("10.0.0.1", 8080))]
    );
}

#[tokio::test(start_paused = true)]
pub(crate) async fn cached_data_allows_immediate_resolution() {
    let (builder, cache, client, mut calls) = builder();
    let (opts, mut first_work_rx) = resolver_options(ChannelOptions::new());
    let mut first = builder.build(&"k8s:///svc-c".parse().unwrap(), opts);
    first.resolve_now();
    assert_eq!(calls.recv().await, Some(Call::List));
    wait_for_phase(&cache, WatchPhase::Running).await;
    client.send(event(
        WatchEventType::Added,
        slice("r1", "svc-c", &["10.0.0.1"], &[("grpc", 50051)]),
    ));
    first_work_rx.recv().await.unwrap();

    // A second resolver for the same service shares the connection and sees
    // the cached addresses on its first request.
    let (opts, mut second_work_rx) = resolver_options(ChannelOptions::new());
    let mut second = builder.build(&"k8s:///svc-c".parse().unwrap(), opts);
    second.resolve_now();
    second_work_rx.recv().await.unwrap();
    let (mut channel_controller, mut update_rx) = channel_controller();
    second.work(&mut channel_controller);
    assert!(update_rx.recv().await.unwrap().endpoints.is_ok());

    let more = time::timeout(Duration::from_secs(1), calls.recv()).await;
    assert!(more.is_err(), "unexpected call {more:?}");
}

#[tokio::test(start_paused = true)]
pub(crate) async fn drop_unregisters_from_cache() {
    let (builder, cache, _client, mut calls) = builder();
    let target = &"k8s:///svc-c".parse().unwrap();
    let (opts, _work_rx) = resolver_options(ChannelOptions::new());
    let mut resolver = builder.build(target, opts);

    resolver.resolve_now();
    assert_eq!(calls.recv().await, Some(Call::List));
    wait_for_phase(&cache, WatchPhase::Running).await;
    drop(resolver);
    assert_eq!(cache.watch_phase(), WatchPhase::Stopped);

    // Dropping a resolver that never registered is a no-op.
    let (opts, _work_rx) = resolver_options(ChannelOptions::new());
    drop(builder.build(target, opts));
    assert_eq!(cache.watch_phase(), WatchPhase::Stopped);
}

#[tokio::test(start_paused = true)]
pub(crate) async fn registers_again_after_cache_shutdown() {
    let (builder, cache, client, mut calls) = builder();
    let target = &"k8s:///svc-c".parse().unwrap();
    let (opts, mut work_rx) = resolver_options(ChannelOptions::new());
    let mut resolver = builder.build(target, opts);
    let (mut channel_controller, mut update_rx) = channel_controller();

    resolver.resolve_now();
    assert_eq!(calls.recv().await, Some(Call::List));
    wait_for_phase(&cache, WatchPhase::Running).await;
    client.send(event(
        WatchEventType::Added,
        slice("r1", "svc-c", &["10.0.0.1"], &[("grpc", 50051)]),
    ));
    work_rx.recv().await.unwrap();
    resolver.work(&mut channel_controller);
    assert!(update_rx.recv().await.unwrap().endpoints.is_ok());

    cache.shutdown();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    resolver.resolve_now();
    let call = time::timeout(Duration::from_secs(1), calls.recv()).await;
    assert_eq!(call.unwrap(), Some(Call::List));
    wait_for_phase(&cache, WatchPhase::Running).await;

    // The fresh list no longer holds r1.
    work_rx.recv().await.unwrap();
    resolver.work(&mut channel_controller);
    assert!(update_rx.recv().await.unwrap().endpoints.is_err());

    client.send(event(
        WatchEventType::Added,
        slice("r1", "svc-c", &["10.0.0.2"], &[("grpc", 50051)]),
    ));
    work_rx.recv().await.unwrap();
    resolver.work(&mut channel_controller);
    assert_eq!(
        update_rx.recv().await.unwrap().endpoints.unwrap(),
        vec![Endpoint::single(Address::tcp("10.0.0.2", 50051))]
    );
}
