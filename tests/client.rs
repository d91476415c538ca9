mod common;

use bytes::Bytes;
use common::{eventually, test_config, Behavior, FakeTv, ART, CONTROL, REMOTE};
use samsungtv_ws::{
    ArtModeStatus, ChannelFault, ChannelKind, ChannelState, ClientConfig, HeartbeatConfig,
    LaunchMethod, MatteList, MemoryTokenPersistence, SamsungTv, StateUpdate, TokenPersistence,
    TvError,
};
use std::sync::Arc;
use std::time::Duration;

fn client(fake: &FakeTv) -> SamsungTv {
    client_with(fake, Arc::new(MemoryTokenPersistence::default()))
}

fn client_with(fake: &FakeTv, persistence: Arc<MemoryTokenPersistence>) -> SamsungTv {
    SamsungTv::new(fake.endpoint(), test_config(), persistence).unwrap()
}

fn client_configured(fake: &FakeTv, config: ClientConfig) -> SamsungTv {
    SamsungTv::new(
        fake.endpoint(),
        config,
        Arc::new(MemoryTokenPersistence::default()),
    )
    .unwrap()
}

fn fast_heartbeat() -> ClientConfig {
    let mut config = test_config();
    config.heartbeat = Some(HeartbeatConfig {
        interval: Duration::from_millis(50),
        timeout: Duration::from_millis(150),
    });
    config.reconnect.max_retries = Some(10);
    config
}

/// Client tolerating the fake's reply delay
fn patient_client(fake: &FakeTv) -> SamsungTv {
    let mut config = test_config();
    config.request_timeout = Duration::from_secs(3);
    config.thumbnail_timeout = Duration::from_secs(3);
    SamsungTv::new(
        fake.endpoint(),
        config,
        Arc::new(MemoryTokenPersistence::default()),
    )
    .unwrap()
}

#[tokio::test]
async fn key_press_reaches_remote_channel() {
    let fake = FakeTv::start(Behavior::default()).await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();

    tv.send_key("KEY_POWER").await.unwrap();

    assert!(eventually(|| !fake.received_on(REMOTE).is_empty()).await);
    let frame = &fake.received_on(REMOTE)[0];
    assert_eq!(frame["method"], "ms.remote.control");
    assert_eq!(frame["params"]["Cmd"], "Click");
    assert_eq!(frame["params"]["DataOfCmd"], "KEY_POWER");
    assert_eq!(frame["params"]["TypeOfRemote"], "SendRemoteKey");

    tv.close_all().await;
}

#[tokio::test]
async fn standard_launch_uses_control_channel() {
    let fake = FakeTv::start(Behavior::default()).await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();

    tv.launch_app("111299001912", LaunchMethod::Standard)
        .await
        .unwrap();

    assert!(eventually(|| !fake.received_on(CONTROL).is_empty()).await);
    let frame = &fake.received_on(CONTROL)[0];
    assert_eq!(frame["method"], "ms.application.start");
    assert_eq!(frame["params"]["id"], "111299001912");

    tv.close_all().await;
}

#[tokio::test]
async fn issued_token_is_persisted_and_used_on_reconnect() {
    let fake = FakeTv::start(Behavior {
        issue_token: Some("12345".to_string()),
        ..Behavior::default()
    })
    .await;
    let persistence = Arc::new(MemoryTokenPersistence::default());
    let tv = client_with(&fake, persistence.clone());
    tv.connect_all().await.unwrap();

    assert_eq!(tv.token().as_deref(), Some("12345"));
    assert_eq!(persistence.load_token().as_deref(), Some("12345"));
    assert!(fake.connections_to(CONTROL)[0].contains("name="));

    fake.drop_connections();
    assert!(
        eventually(|| fake
            .connections_to(CONTROL)
            .iter()
            .any(|uri| uri.contains("token=12345")))
        .await
    );
    assert!(eventually(|| tv.channel_status(ChannelKind::Control).is_connected()).await);

    tv.close_all().await;
}

#[tokio::test]
async fn rejected_token_is_not_retried() {
    let fake = FakeTv::start(Behavior {
        reject_auth: true,
        ..Behavior::default()
    })
    .await;
    let tv = client(&fake);

    assert!(matches!(
        tv.connect_all().await,
        Err(TvError::AuthRejected(_))
    ));
    assert_eq!(
        tv.channel_status(ChannelKind::Remote).fault,
        Some(ChannelFault::AuthRejected)
    );
    assert!(matches!(
        tv.send_key("KEY_HOME").await,
        Err(TvError::AuthRejected(ChannelKind::Remote))
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fake.connections_to(REMOTE).len(), 1);

    tv.close_all().await;
}

#[tokio::test]
async fn art_support_and_current_artwork() {
    let fake = FakeTv::start(Behavior::default()).await;
    let tv = client(&fake);
    let mut updates = tv.subscribe_state();
    tv.connect_all().await.unwrap();

    assert!(tv.art_support_determined().await.unwrap());
    assert!(tv.get_art_support());

    let art = tv.get_current_artwork().await.unwrap();
    assert_eq!(art.current_artwork_id.as_deref(), Some("A1"));
    assert_eq!(art.current_artwork_label.as_deref(), Some("Sunset"));

    let changed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let StateUpdate::ArtworkChanged { current, .. } = updates.recv().await.unwrap() {
                return current;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(changed.as_deref(), Some("A1"));

    tv.close_all().await;
}

#[tokio::test]
async fn missing_art_app_is_detected() {
    let fake = FakeTv::start(Behavior {
        art_supported: false,
        ..Behavior::default()
    })
    .await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();

    assert!(!tv.art_support_determined().await.unwrap());
    assert!(!tv.get_art_support());

    tv.close_all().await;
}

#[tokio::test]
async fn brightness_changes_only_on_confirmation() {
    let fake = FakeTv::start(Behavior {
        confirm_sets: false,
        ..Behavior::default()
    })
    .await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();
    tv.art_support_determined().await.unwrap();

    assert!(matches!(
        tv.set_art_brightness(60).await,
        Err(TvError::RequestTimeout(_))
    ));
    assert_eq!(tv.art_snapshot().brightness, None);

    fake.set_behavior(|b| b.confirm_sets = true);
    tv.set_art_brightness(60).await.unwrap();
    assert_eq!(tv.art_snapshot().brightness, Some(60));

    tv.close_all().await;
}

#[tokio::test]
async fn duplicate_set_is_busy() {
    let fake = FakeTv::start(Behavior {
        reply_delay: Duration::from_millis(200),
        ..Behavior::default()
    })
    .await;
    let tv = patient_client(&fake);
    tv.connect_all().await.unwrap();
    tv.art_support_determined().await.unwrap();

    let (first, second) = tokio::join!(tv.set_art_brightness(30), tv.set_art_brightness(40));
    assert!(first.is_ok());
    assert!(matches!(second, Err(TvError::Busy(_))));
    assert_eq!(fake.art_requests("set_brightness").len(), 1);

    tv.close_all().await;
}

#[tokio::test]
async fn concurrent_thumbnail_misses_share_one_request() {
    let fake = FakeTv::start(Behavior {
        reply_delay: Duration::from_millis(100),
        ..Behavior::default()
    })
    .await;
    let tv = patient_client(&fake);
    tv.connect_all().await.unwrap();
    tv.art_support_determined().await.unwrap();

    let (a, b, c) = tokio::join!(
        tv.get_artwork_thumbnail("A1"),
        tv.get_artwork_thumbnail("A1"),
        tv.get_artwork_thumbnail("A1"),
    );
    let expected = Bytes::from_static(b"jpeg:A1");
    assert_eq!(a.unwrap(), expected);
    assert_eq!(b.unwrap(), expected);
    assert_eq!(c.unwrap(), expected);
    assert_eq!(fake.art_requests("get_thumbnail").len(), 1);

    // Served from cache
    assert_eq!(tv.get_artwork_thumbnail("A1").await.unwrap(), expected);
    assert_eq!(fake.art_requests("get_thumbnail").len(), 1);

    tv.close_all().await;
}

#[tokio::test]
async fn thumbnail_timeout_does_not_poison_cache() {
    let fake = FakeTv::start(Behavior {
        answer_thumbnails: false,
        ..Behavior::default()
    })
    .await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();
    tv.art_support_determined().await.unwrap();

    assert!(matches!(
        tv.get_artwork_thumbnail("A1").await,
        Err(TvError::RequestTimeout(_))
    ));
    assert_eq!(fake.art_requests("get_thumbnail").len(), 1);
    assert!(tv.pending_requests().is_empty());

    fake.set_behavior(|b| b.answer_thumbnails = true);
    assert_eq!(
        tv.get_artwork_thumbnail("A1").await.unwrap(),
        Bytes::from_static(b"jpeg:A1")
    );
    assert_eq!(fake.art_requests("get_thumbnail").len(), 2);

    tv.close_all().await;
}

#[tokio::test]
async fn disconnect_fails_pending_requests_with_channel_lost() {
    let fake = FakeTv::start(Behavior {
        answer_thumbnails: false,
        ..Behavior::default()
    })
    .await;
    let mut config = test_config();
    config.thumbnail_timeout = Duration::from_secs(30);
    let tv = Arc::new(
        SamsungTv::new(
            fake.endpoint(),
            config,
            Arc::new(MemoryTokenPersistence::default()),
        )
        .unwrap(),
    );
    tv.connect_all().await.unwrap();
    tv.art_support_determined().await.unwrap();

    let fetch = tokio::spawn({
        let tv = tv.clone();
        async move { tv.get_artwork_thumbnail("A7").await }
    });
    assert!(eventually(|| !fake.art_requests("get_thumbnail").is_empty()).await);

    fake.drop_connections();
    let result = tokio::time::timeout(Duration::from_secs(5), fetch)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(TvError::ChannelLost(ChannelKind::Art))));

    tv.close_all().await;
}

#[tokio::test]
async fn retry_ceiling_marks_channel_unavailable() {
    let fake = FakeTv::start(Behavior::default()).await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();
    let sent_before = fake.received_on(REMOTE).len();

    fake.shutdown();
    assert!(
        eventually(|| tv.channel_status(ChannelKind::Remote).fault
            == Some(ChannelFault::Unavailable))
        .await
    );
    let status = tv.channel_status(ChannelKind::Remote);
    assert_eq!(status.state, ChannelState::Disconnected);

    assert!(matches!(
        tv.send_key("KEY_HOME").await,
        Err(TvError::ChannelUnavailable(ChannelKind::Remote))
    ));
    assert_eq!(fake.received_on(REMOTE).len(), sent_before);

    tv.close_all().await;
}

#[tokio::test]
async fn close_all_stops_every_channel() {
    let fake = FakeTv::start(Behavior::default()).await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();
    assert!(tv.channel_status(ChannelKind::Art).is_connected());

    tv.close_all().await;
    for kind in ChannelKind::ALL {
        assert_eq!(tv.channel_status(kind).state, ChannelState::Disconnected);
    }
    assert!(matches!(
        tv.send_key("KEY_HOME").await,
        Err(TvError::ConnectionClosed)
    ));
    assert!(tv.pending_requests().is_empty());

    // Second close is a no-op
    tv.close_all().await;
    assert_eq!(fake.connections_to(ART).len(), 1);
}

#[tokio::test]
async fn ready_greeting_completes_pairing() {
    let fake = FakeTv::start(Behavior {
        greet_with_ready: true,
        ..Behavior::default()
    })
    .await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();

    assert!(tv.channel_status(ChannelKind::Remote).is_connected());
    assert!(tv.channel_status(ChannelKind::Control).is_connected());
    tv.send_key("KEY_HOME").await.unwrap();
    assert!(eventually(|| !fake.received_on(REMOTE).is_empty()).await);
    assert_eq!(fake.connections_to(REMOTE).len(), 1);

    tv.close_all().await;
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_losing_the_channel() {
    let fake = FakeTv::start(Behavior {
        noise_after_greeting: true,
        ..Behavior::default()
    })
    .await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();

    // The valid frame after the noise still lands
    assert!(eventually(|| tv.device_state().touch_enabled).await);
    assert!(tv.channel_status(ChannelKind::Remote).is_connected());
    assert_eq!(fake.connections_to(REMOTE).len(), 1);

    tv.send_key("KEY_MUTE").await.unwrap();
    assert!(eventually(|| !fake.received_on(REMOTE).is_empty()).await);

    tv.close_all().await;
}

#[tokio::test]
async fn silent_socket_is_replaced_after_heartbeat_timeout() {
    let fake = FakeTv::start(Behavior {
        stall: true,
        ..Behavior::default()
    })
    .await;
    let tv = client_configured(&fake, fast_heartbeat());
    tv.connect_all().await.unwrap();

    assert!(eventually(|| fake.connections_to(REMOTE).len() >= 2).await);

    tv.close_all().await;
}

#[tokio::test]
async fn answered_heartbeat_keeps_the_socket() {
    let fake = FakeTv::start(Behavior::default()).await;
    let tv = client_configured(&fake, fast_heartbeat());
    tv.connect_all().await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fake.connections_to(REMOTE).len(), 1);
    assert!(tv.channel_status(ChannelKind::Remote).is_connected());
    assert!(tv.last_activity(ChannelKind::Remote).is_some());

    tv.close_all().await;
}

#[tokio::test]
async fn status_report_is_not_taken_as_set_confirmation() {
    let fake = FakeTv::start(Behavior {
        confirm_sets: false,
        ..Behavior::default()
    })
    .await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();
    tv.art_support_determined().await.unwrap();

    // The TV answers with a plain status report saying "off"
    assert!(matches!(
        tv.set_art_mode(true).await,
        Err(TvError::RequestTimeout(_))
    ));
    assert_eq!(tv.art_snapshot().status, ArtModeStatus::Off);

    fake.set_behavior(|b| b.confirm_sets = true);
    tv.set_art_mode(true).await.unwrap();
    assert_eq!(tv.art_snapshot().status, ArtModeStatus::On);

    tv.close_all().await;
}

#[tokio::test]
async fn set_while_status_query_is_in_flight_is_not_busy() {
    let fake = FakeTv::start(Behavior {
        reply_delay: Duration::from_millis(300),
        ..Behavior::default()
    })
    .await;
    let tv = patient_client(&fake);
    tv.connect_all().await.unwrap();

    // Startup support detection queries the art mode status
    assert!(
        eventually(|| tv
            .pending_requests()
            .iter()
            .any(|p| p.correlation_key == "get_artmode_status"))
        .await
    );

    tv.set_art_mode(false).await.unwrap();
    assert_eq!(fake.art_requests("set_artmode_status").len(), 1);
    assert_eq!(tv.art_snapshot().status, ArtModeStatus::Off);

    tv.close_all().await;
}

#[tokio::test]
async fn close_app_stops_it_on_control_channel() {
    let fake = FakeTv::start(Behavior::default()).await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();

    tv.close_app("3201907018807", LaunchMethod::Standard)
        .await
        .unwrap();

    assert!(eventually(|| !fake.received_on(CONTROL).is_empty()).await);
    let frame = &fake.received_on(CONTROL)[0];
    assert_eq!(frame["method"], "ms.application.stop");
    assert_eq!(frame["params"]["id"], "3201907018807");

    assert!(matches!(
        tv.close_app("", LaunchMethod::Standard).await,
        Err(TvError::InvalidArgument(_))
    ));

    tv.close_all().await;
}

#[tokio::test]
async fn matte_and_photo_filter_lists() {
    let fake = FakeTv::start(Behavior::default()).await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();
    tv.art_support_determined().await.unwrap();

    let mattes = tv.get_matte_list().await.unwrap();
    assert_eq!(mattes.types, vec!["none", "shadowbox"]);
    assert_eq!(mattes.colors, vec!["polar"]);
    assert_eq!(
        MatteList::matte_id("shadowbox", Some("polar")),
        "shadowbox_polar"
    );

    let filters = tv.get_photo_filter_list().await.unwrap();
    let ids: Vec<_> = filters.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["none", "ink"]);
    assert_eq!(filters[1].name.as_deref(), Some("Ink"));

    tv.close_all().await;
}

#[tokio::test]
async fn favorite_and_delete_are_confirmed() {
    let fake = FakeTv::start(Behavior::default()).await;
    let tv = client(&fake);
    tv.connect_all().await.unwrap();
    tv.art_support_determined().await.unwrap();

    tv.set_artwork_favorite("A1", true).await.unwrap();
    let request = &fake.art_requests("change_favorite")[0];
    assert_eq!(request["content_id"], "A1");
    assert_eq!(request["status"], "on");

    // Deleted artworks lose their cached thumbnail
    tv.get_artwork_thumbnail("A2").await.unwrap();
    tv.delete_artworks(&["A2", "A3"]).await.unwrap();
    let request = &fake.art_requests("delete_image_list")[0];
    assert_eq!(
        request["content_id_list"],
        serde_json::json!([{"content_id": "A2"}, {"content_id": "A3"}])
    );
    tv.get_artwork_thumbnail("A2").await.unwrap();
    assert_eq!(fake.art_requests("get_thumbnail").len(), 2);

    tv.delete_artwork("A4").await.unwrap();
    assert_eq!(fake.art_requests("delete_image_list").len(), 2);
    assert!(matches!(
        tv.delete_artworks(&[]).await,
        Err(TvError::InvalidArgument(_))
    ));

    tv.close_all().await;
}

#[tokio::test]
async fn replaced_token_recovers_from_rejection() {
    let fake = FakeTv::start(Behavior {
        reject_auth: true,
        ..Behavior::default()
    })
    .await;
    let tv = client(&fake);
    assert!(matches!(
        tv.connect_all().await,
        Err(TvError::AuthRejected(_))
    ));

    fake.set_behavior(|b| b.reject_auth = false);
    tv.set_token(Some("fresh"));
    assert_eq!(tv.token().as_deref(), Some("fresh"));
    tv.connect_all().await.unwrap();

    assert!(tv.channel_status(ChannelKind::Remote).is_connected());
    assert!(fake
        .connections_to(REMOTE)
        .last()
        .is_some_and(|uri| uri.contains("token=fresh")));

    tv.close_all().await;
}
