//! Channel engine scenarios driven through scripted sockets and manual timers

mod common;

use std::time::Duration;

use common::*;
use doip_transport::reader::ReaderKind;
use doip_transport::{
    ChannelState, DoIpConfig, DoIpError, GlobalChannelId, IndicationResult, ReadStatus,
    TargetAddressType, TransmissionResult, UdsMessage,
};

// ============================================================================
// Routing activation
// ============================================================================

#[test]
fn test_routing_activation_success() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();
    assert_eq!(
        h.timers.active_for(slot).map(|(_, d)| d),
        Some(Duration::from_millis(2000))
    );

    let status = h.feed(slot, &socket, &routing_activation_request(TESTER, 0x00));
    assert_eq!(status, ReadStatus::WouldBlock);

    let sent = socket.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload_type, 0x0006);
    assert_eq!(
        sent[0].payload,
        vec![0x0E, 0x80, 0x00, 0x10, 0x10, 0x00, 0x00, 0x00, 0x00]
    );

    let channel = h.handler.channel(slot).unwrap();
    assert_eq!(channel.state(), ChannelState::RegisteredRoutingActive);
    assert_eq!(channel.source_address(), TESTER);
    assert_eq!(channel.channel_id(), TESTER as u32);
    assert_eq!(
        h.timers.active_for(slot).map(|(_, d)| d),
        Some(Duration::from_millis(5000))
    );
    assert_eq!(h.timers.active().len(), 1);
}

#[test]
fn test_routing_activation_with_oem_field() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();

    let mut request = header(0x0005, 11);
    request.extend_from_slice(&[0x0E, 0x80, 0x00, 0, 0, 0, 0, 0xAA, 0xBB, 0xCC, 0xDD]);
    h.feed(slot, &socket, &request);

    assert_eq!(socket.sent_messages()[0].payload[4], 0x10);
    assert_eq!(
        h.handler.channel(slot).unwrap().state(),
        ChannelState::RegisteredRoutingActive
    );
}

#[test]
fn test_routing_activation_unknown_source_address() {
    let mut config = DoIpConfig::default();
    config.routing_activation.min_source_address = 0x0E00;
    config.routing_activation.max_source_address = 0x0EFF;
    let mut h = Harness::with_config(config);
    let (slot, socket) = h.connect();

    let status = h.feed(slot, &socket, &routing_activation_request(0x0F00, 0x00));

    assert_eq!(status, ReadStatus::Closed);
    let sent = socket.sent_messages();
    assert_eq!(sent[0].payload[4], 0x00);
    assert!(socket.is_closed());
    assert_eq!(h.handler.channel(slot).unwrap().state(), ChannelState::Listen);
}

#[test]
fn test_routing_activation_unsupported_type() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();

    h.feed(slot, &socket, &routing_activation_request(TESTER, 0x01));

    assert_eq!(socket.sent_messages()[0].payload[4], 0x06);
    assert!(socket.is_closed());
    assert_eq!(h.handler.channel(slot).unwrap().state(), ChannelState::Listen);
}

#[test]
fn test_reactivation_with_same_address_is_idempotent() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);

    h.feed(slot, &socket, &routing_activation_request(TESTER, 0x00));

    let sent = socket.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload[4], 0x10);
    let channel = h.handler.channel(slot).unwrap();
    assert_eq!(channel.state(), ChannelState::RegisteredRoutingActive);
    assert_eq!(channel.source_address(), TESTER);
    assert_eq!(
        h.mgr.reestablished(),
        vec![GlobalChannelId {
            handler_id: HANDLER_ID,
            channel_id: TESTER as u32,
        }]
    );
}

#[test]
fn test_reactivation_with_different_address_is_rejected() {
    let mut h = Harness::new();
    let (first, first_socket) = h.activate(TESTER);
    let (second, second_socket) = h.activate(0x0E81);

    let status = h.feed(second, &second_socket, &routing_activation_request(TESTER, 0x00));

    assert_eq!(status, ReadStatus::Closed);
    let sent = second_socket.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload[4], 0x02);
    assert!(second_socket.is_closed());
    assert_eq!(h.handler.channel(second).unwrap().state(), ChannelState::Listen);

    assert!(!first_socket.is_closed());
    assert_eq!(
        h.handler.channel(first).unwrap().state(),
        ChannelState::RegisteredRoutingActive
    );
}

#[test]
fn test_activation_beyond_max_channels_uses_spare_slot() {
    let mut config = DoIpConfig::default();
    config.tcp.max_channels = 1;
    let mut h = Harness::with_config(config);

    let (first, _) = h.activate(TESTER);
    let (second, second_socket) = h.connect();
    h.feed(second, &second_socket, &routing_activation_request(0x0E81, 0x00));

    assert_eq!(second_socket.sent_messages()[0].payload[4], 0x10);
    assert_eq!(h.handler.established_channels(), 2);
    assert!(h.handler.is_source_address_registered(TESTER));
    assert!(h.handler.is_source_address_registered(0x0E81));
    assert_ne!(first, second);
}

// ============================================================================
// Header validation
// ============================================================================

#[test]
fn test_incorrect_pattern_closes_connection() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();

    let mut request = routing_activation_request(TESTER, 0x00);
    request[1] = 0xFC;
    let status = h.feed(slot, &socket, &request);

    assert_eq!(status, ReadStatus::Closed);
    let sent = socket.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload_type, 0x0000);
    assert_eq!(sent[0].payload, vec![0x00]);
    assert!(socket.is_closed());
    assert_eq!(h.handler.channel(slot).unwrap().state(), ChannelState::Listen);
    assert!(h.mgr.indications().is_empty());
}

#[test]
fn test_invalid_payload_length_closes_connection() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();

    let mut request = header(0x0005, 8);
    request.extend_from_slice(&[0x0E, 0x80, 0x00, 0, 0, 0, 0, 0]);
    h.feed(slot, &socket, &request);

    assert_eq!(socket.sent_messages()[0].payload, vec![0x04]);
    assert!(socket.is_closed());
}

#[test]
fn test_close_after_nack_survives_failed_flush() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();

    // header promises a payload the peer never sends
    socket.push(header(0x0005, 8));
    socket.push_eof();
    let status = h.pump(slot);

    assert_eq!(status, ReadStatus::Closed);
    assert_eq!(socket.sent_messages()[0].payload, vec![0x04]);
    assert_eq!(socket.close_calls(), 1);
    let channel = h.handler.channel(slot).unwrap();
    assert_eq!(channel.state(), ChannelState::Listen);
    assert!(!channel.is_inactivity_timer_running());
}

#[test]
fn test_unknown_payload_type_is_drained() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();

    let length = 3000usize;
    let mut stream = header(0x1234, length as u32);
    stream.extend((0..length).map(|i| i as u8));
    stream.extend(routing_activation_request(TESTER, 0x00));
    socket.push_chunked(&stream, 700);
    let status = h.pump(slot);

    assert_eq!(status, ReadStatus::WouldBlock);
    assert_eq!(socket.pending_bytes(), 0);
    let sent = socket.sent_messages();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].payload, vec![0x01]);
    assert_eq!(sent[1].payload_type, 0x0006);
    assert_eq!(sent[1].payload[4], 0x10);
    assert!(!socket.is_closed());
}

#[test]
fn test_payload_type_not_served_on_tcp_is_rejected() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();

    // vehicle identification request belongs to UDP
    h.feed(slot, &socket, &header(0x0001, 0));

    assert_eq!(socket.sent_messages()[0].payload, vec![0x01]);
    assert!(!socket.is_closed());
    assert_eq!(h.handler.channel(slot).unwrap().state(), ChannelState::Initialized);
}

#[test]
fn test_message_too_large_is_drained() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);

    let mut stream = header(0x8001, 5000);
    stream.extend(std::iter::repeat(0x55).take(5000));
    stream.extend(diagnostic_message(TESTER, ENTITY, &[0x3E, 0x00]));
    socket.push_chunked(&stream, 1500);
    h.pump(slot);

    let sent = socket.sent_messages();
    assert_eq!(sent[0].payload_type, 0x0000);
    assert_eq!(sent[0].payload, vec![0x02]);
    assert_eq!(sent[1].payload_type, 0x8002);
    let handled = h.mgr.handled();
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].payload(), &[0x3E, 0x00]);
}

// ============================================================================
// Diagnostic messages
// ============================================================================

#[test]
fn test_diagnostic_message_in_chunks() {
    let request: Vec<u8> = (0..40u8).collect();
    for chunk_size in [1, 2, 3, 5, 8, 13, 64] {
        let mut h = Harness::new();
        let (slot, socket) = h.activate(TESTER);

        socket.push_chunked(&diagnostic_message(TESTER, ENTITY, &request), chunk_size);
        h.pump(slot);

        let handled = h.mgr.handled();
        assert_eq!(handled.len(), 1, "chunk size {chunk_size}");
        assert_eq!(handled[0].payload(), request.as_slice());
        assert_eq!(handled[0].source_address(), TESTER);
        assert_eq!(handled[0].target_address(), ENTITY);

        let sent = socket.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload_type, 0x8002);
        assert_eq!(sent[0].payload, vec![0x00, 0x10, 0x0E, 0x80, 0x00]);
        assert_eq!(
            h.handler.channel(slot).unwrap().active_reader(),
            ReaderKind::Header
        );
    }
}

#[test]
fn test_back_to_back_diagnostic_messages() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);

    let mut stream = diagnostic_message(TESTER, ENTITY, &[0x22, 0xF1, 0x90]);
    stream.extend(diagnostic_message(TESTER, ENTITY, &[0x10, 0x03]));
    h.feed(slot, &socket, &stream);

    let handled = h.mgr.handled();
    assert_eq!(handled.len(), 2);
    assert_eq!(handled[0].payload(), &[0x22, 0xF1, 0x90]);
    assert_eq!(handled[1].payload(), &[0x10, 0x03]);
    let indications = h.mgr.indications();
    assert_eq!(indications[0].size, 3);
    assert_eq!(indications[0].target_address_type, TargetAddressType::Physical);
    assert_eq!(
        indications[0].global_channel_id,
        GlobalChannelId {
            handler_id: HANDLER_ID,
            channel_id: TESTER as u32,
        }
    );
}

#[test]
fn test_diagnostic_before_activation_is_discarded() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();

    h.feed(slot, &socket, &diagnostic_message(TESTER, ENTITY, &[0x22, 0xF1, 0x90]));

    assert!(socket.sent().is_empty());
    assert!(h.mgr.indications().is_empty());
    assert_eq!(socket.pending_bytes(), 0);
    assert!(!socket.is_closed());
    assert_eq!(h.handler.channel(slot).unwrap().state(), ChannelState::Initialized);
}

#[test]
fn test_diagnostic_with_foreign_source_address_closes() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);

    let status = h.feed(slot, &socket, &diagnostic_message(0x0E81, ENTITY, &[0x22, 0xF1, 0x90]));

    assert_eq!(status, ReadStatus::Closed);
    let sent = socket.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload_type, 0x8003);
    assert_eq!(sent[0].payload, vec![0x00, 0x10, 0x0E, 0x81, 0x02]);
    assert!(socket.is_closed());
    assert!(h.mgr.indications().is_empty());
    assert_eq!(h.handler.channel(slot).unwrap().state(), ChannelState::Listen);
}

#[test]
fn test_diagnostic_to_unknown_target_is_discarded() {
    let mut config = DoIpConfig::default();
    config.target_addresses = vec![ENTITY];
    let mut h = Harness::with_config(config);
    let (slot, socket) = h.activate(TESTER);

    let mut stream = diagnostic_message(TESTER, 0x0020, &[0x22, 0xF1, 0x90]);
    stream.extend(diagnostic_message(TESTER, ENTITY, &[0x3E, 0x00]));
    h.feed(slot, &socket, &stream);

    let sent = socket.sent_messages();
    assert_eq!(sent[0].payload_type, 0x8003);
    assert_eq!(sent[0].payload, vec![0x00, 0x20, 0x0E, 0x80, 0x03]);
    assert_eq!(sent[1].payload_type, 0x8002);
    assert_eq!(h.mgr.handled().len(), 1);
    assert!(!socket.is_closed());
}

#[test]
fn test_functional_target_bypasses_target_list() {
    let mut config = DoIpConfig::default();
    config.target_addresses = vec![ENTITY];
    let mut h = Harness::with_config(config);
    let (slot, socket) = h.activate(TESTER);

    h.feed(slot, &socket, &diagnostic_message(TESTER, 0xE400, &[0x3E, 0x80]));

    let indications = h.mgr.indications();
    assert_eq!(indications.len(), 1);
    assert_eq!(indications[0].target_address_type, TargetAddressType::Functional);
    assert_eq!(h.mgr.handled().len(), 1);
}

#[test]
fn test_indication_rejections_map_to_nack_codes() {
    let cases = [
        (IndicationResult::Overflow, false, 0x04),
        (IndicationResult::Busy, false, 0x05),
        (IndicationResult::Ok, true, 0x05),
    ];
    for (result, withhold, code) in cases {
        let mut h = Harness::new();
        let (slot, socket) = h.activate(TESTER);
        h.mgr.set_indication_result(result);
        h.mgr.set_withhold_message(withhold);

        h.feed(slot, &socket, &diagnostic_message(TESTER, ENTITY, &[0x22, 0xF1, 0x90]));

        let sent = socket.sent_messages();
        assert_eq!(sent.len(), 1, "{result:?}");
        assert_eq!(sent[0].payload_type, 0x8003);
        assert_eq!(sent[0].payload[4], code, "{result:?}");
        assert!(h.mgr.handled().is_empty());
        assert_eq!(socket.pending_bytes(), 0);
        assert_eq!(
            h.handler.channel(slot).unwrap().state(),
            ChannelState::RegisteredRoutingActive
        );
    }
}

#[test]
fn test_buffer_of_wrong_size_is_returned() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);
    h.mgr.set_allocation_size(Some(2));

    h.feed(slot, &socket, &diagnostic_message(TESTER, ENTITY, &[0x22, 0xF1, 0x90]));

    let sent = socket.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload_type, 0x8003);
    assert_eq!(sent[0].payload, vec![0x00, 0x10, 0x0E, 0x80, 0x05]);
    let failed = h.mgr.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].payload().len(), 2);
    assert!(h.mgr.handled().is_empty());
    assert_eq!(socket.pending_bytes(), 0);
    assert_eq!(
        h.handler.channel(slot).unwrap().state(),
        ChannelState::RegisteredRoutingActive
    );

    // the next message of the right size goes through
    h.mgr.set_allocation_size(None);
    h.feed(slot, &socket, &diagnostic_message(TESTER, ENTITY, &[0x3E, 0x00]));
    assert_eq!(h.mgr.handled().len(), 1);
}

#[test]
fn test_peer_close_mid_payload_reports_failure() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);

    let request = diagnostic_message(TESTER, ENTITY, &[0x2E, 0xF1, 0x90, 0x01, 0x02]);
    socket.push(request[..14].to_vec());
    socket.push_eof();
    let status = h.pump(slot);

    assert_eq!(status, ReadStatus::Closed);
    assert!(h.mgr.handled().is_empty());
    let failed = h.mgr.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source_address(), TESTER);
    assert_eq!(h.handler.channel(slot).unwrap().state(), ChannelState::Listen);
}

#[test]
fn test_timeout_mid_payload_reports_failure() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);

    let request = diagnostic_message(TESTER, ENTITY, &[0x2E, 0xF1, 0x90, 0x01, 0x02]);
    h.feed(slot, &socket, &request[..13]);
    assert_eq!(
        h.handler.channel(slot).unwrap().active_reader(),
        ReaderKind::Diagnostic
    );

    let key = h.timers.expire(slot).unwrap();
    h.handler.on_timeout(key);

    assert_eq!(h.mgr.failed().len(), 1);
    assert!(socket.is_closed());
    assert_eq!(h.handler.channel(slot).unwrap().state(), ChannelState::Listen);
}

// ============================================================================
// Inactivity timers
// ============================================================================

#[test]
fn test_initial_inactivity_timeout_closes() {
    let mut h = Harness::new();
    let (slot, socket) = h.connect();

    assert!(h.handler.channel(slot).unwrap().is_inactivity_timer_running());
    let key = h.timers.expire(slot).unwrap();
    h.handler.on_timeout(key);

    assert_eq!(socket.close_calls(), 1);
    assert!(socket.sent().is_empty());
    let channel = h.handler.channel(slot).unwrap();
    assert_eq!(channel.state(), ChannelState::Listen);
    assert!(!channel.has_socket());
    assert!(!channel.is_inactivity_timer_running());
}

#[test]
fn test_general_inactivity_timeout_closes() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);

    let (key, timeout) = h.timers.active_for(slot).unwrap();
    assert_eq!(timeout, Duration::from_millis(5000));
    h.timers.expire(slot);
    h.handler.on_timeout(key);

    assert!(socket.is_closed());
    assert_eq!(h.handler.channel(slot).unwrap().source_address(), 0);
    assert_eq!(h.handler.established_channels(), 0);
}

#[test]
fn test_traffic_restarts_general_timer_and_stale_key_is_ignored() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);
    let (stale, _) = h.timers.active_for(slot).unwrap();

    h.feed(slot, &socket, &alive_check_response(TESTER));

    let (current, _) = h.timers.active_for(slot).unwrap();
    assert_ne!(stale, current);
    h.handler.on_timeout(stale);
    assert!(!socket.is_closed());
    assert_eq!(
        h.handler.channel(slot).unwrap().state(),
        ChannelState::RegisteredRoutingActive
    );
}

#[test]
fn test_generic_nack_from_tester_is_only_logged() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);

    let mut nack = header(0x0000, 1);
    nack.push(0x03);
    h.feed(slot, &socket, &nack);

    assert!(socket.sent().is_empty());
    assert!(!socket.is_closed());
}

// ============================================================================
// Transmit
// ============================================================================

fn response(payload: Vec<u8>) -> UdsMessage {
    UdsMessage::new(
        ENTITY,
        TESTER,
        TargetAddressType::Physical,
        GlobalChannelId {
            handler_id: HANDLER_ID,
            channel_id: TESTER as u32,
        },
        payload,
    )
}

#[test]
fn test_transmit_frames_diagnostic_message() {
    let mut h = Harness::new();
    let (_, socket) = h.activate(TESTER);

    h.handler
        .transmit(response(vec![0x62, 0xF1, 0x90]), TESTER as u32)
        .unwrap();

    assert_eq!(
        socket.sent(),
        vec![vec![
            0x02, 0xFD, 0x80, 0x01, 0x00, 0x00, 0x00, 0x07, 0x00, 0x10, 0x0E, 0x80, 0x62, 0xF1,
            0x90,
        ]]
    );
    let confirmations = h.mgr.confirmations();
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].1, TransmissionResult::TransmitOk);
}

#[test]
fn test_partial_send_confirms_failure() {
    let mut h = Harness::new();
    let (_, socket) = h.activate(TESTER);
    socket.set_send_limit(Some(4));

    h.handler
        .transmit(response(vec![0x62, 0xF1, 0x90]), TESTER as u32)
        .unwrap();

    assert_eq!(h.mgr.confirmations()[0].1, TransmissionResult::TransmitFailed);
}

#[test]
fn test_send_error_confirms_failure() {
    let mut h = Harness::new();
    let (_, socket) = h.activate(TESTER);
    socket.set_fail_sends(true);

    let result = h
        .handler
        .transmit(response(vec![0x62, 0xF1, 0x90]), TESTER as u32);

    assert!(result.is_ok());
    assert!(socket.sent().is_empty());
    let confirmations = h.mgr.confirmations();
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].1, TransmissionResult::TransmitFailed);
    assert_eq!(confirmations[0].0.payload(), &[0x62, 0xF1, 0x90]);
}

#[test]
fn test_transmit_to_unknown_channel() {
    let mut h = Harness::new();
    h.activate(TESTER);

    let result = h.handler.transmit(response(vec![0x7F, 0x22, 0x31]), 0x0E99);

    assert!(matches!(result, Err(DoIpError::ChannelNotFound(0x0E99))));
    assert_eq!(h.mgr.confirmations()[0].1, TransmissionResult::TransmitFailed);
}

#[test]
fn test_transmit_requires_routing_activation() {
    let mut h = Harness::new();
    let (_, socket) = h.connect();

    let result = h.handler.transmit(response(vec![0x50, 0x01]), TESTER as u32);

    assert!(result.is_err());
    assert!(socket.sent().is_empty());
}

// ============================================================================
// Pool and shutdown
// ============================================================================

#[test]
fn test_pool_saturation_closes_extra_connection() {
    let mut config = DoIpConfig::default();
    config.tcp.max_channels = 1;
    let mut h = Harness::with_config(config);
    assert_eq!(h.handler.capacity(), 2);

    h.connect();
    h.connect();
    let extra = doip_transport::testing::ScriptedSocket::new();
    let result = h.handler.on_accept(extra.clone());

    assert!(matches!(result, Err(DoIpError::PoolSaturated)));
    assert!(extra.is_closed());
}

#[test]
fn test_channel_is_reused_after_close() {
    let mut h = Harness::new();
    let (slot, socket) = h.activate(TESTER);
    socket.push_eof();
    assert_eq!(h.pump(slot), ReadStatus::Closed);

    let (reused, _) = h.activate(TESTER);

    assert_eq!(reused, slot);
    assert_eq!(
        h.handler.channel(reused).unwrap().state(),
        ChannelState::RegisteredRoutingActive
    );
}

#[test]
fn test_shutdown_finalizes_all_channels() {
    let mut h = Harness::new();
    let (_, first) = h.activate(TESTER);
    let (_, second) = h.connect();

    h.handler.shutdown();

    assert!(first.is_closed());
    assert!(second.is_closed());
    assert_eq!(h.handler.established_channels(), 0);
    assert!(h
        .handler
        .channels()
        .iter()
        .all(|c| c.state() == ChannelState::Listen));
    assert!(h.timers.active().is_empty());
}
