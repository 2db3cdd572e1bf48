//! End-to-end tests: a real server on a `LocalSet`, a mock upstream, and
//! responses decoded by an independent DNS implementation.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::{Name, RData, RecordType as WireType};
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::LocalSet;

use dnschef::record::{FileStaging, RecordType, RecordValue};
use dnschef::resolver::FailurePolicy;
use dnschef::server::{Server, ServerConfig};
use dnschef::stats::Stats;
use dnschef::store::RecordStore;
use dnschef::transport::{read_frame, write_frame};
use dnschef::upstream::Upstream;

/// Fixed answer the mock upstream puts in every reply.
const UPSTREAM_ANSWER: [u8; 4] = [93, 184, 216, 34];

struct Harness {
    udp: SocketAddr,
    tcp: SocketAddr,
    store: Arc<RecordStore>,
    stats: Arc<Stats>,
}

/// Mock upstream: echoes the query as a response carrying one A record.
async fn mock_upstream() -> Upstream {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let _ = socket.send_to(&upstream_reply(&buf[..len]), peer).await;
        }
    });

    Upstream::udp("127.0.0.1", port)
}

fn upstream_reply(query: &[u8]) -> Vec<u8> {
    let mut reply = query.to_vec();
    reply[2] |= 0x80;
    reply[3] |= 0x80;
    reply[7] = 1;
    reply.extend_from_slice(&[0xc0, 0x0c, 0, 1, 0, 1, 0, 0, 1, 44, 0, 4]);
    reply.extend_from_slice(&UPSTREAM_ANSWER);
    reply
}

async fn start(store: Arc<RecordStore>, policy: FailurePolicy) -> Harness {
    let upstream = mock_upstream().await;
    start_with(store, policy, upstream, Some(Duration::from_secs(2))).await
}

async fn start_with(
    store: Arc<RecordStore>,
    policy: FailurePolicy,
    upstream: Upstream,
    proxy_timeout: Option<Duration>,
) -> Harness {
    let config = ServerConfig {
        interface: "127.0.0.1".parse().unwrap(),
        port: 0,
        tcp: true,
        upstreams: vec![upstream],
        proxy_timeout,
        failure_policy: policy,
        api: None,
    };

    let server = Server::bind(&config, store.clone()).await.unwrap();
    let harness = Harness {
        udp: server.udp_addr().unwrap(),
        tcp: server.tcp_addr().unwrap().unwrap(),
        store,
        stats: server.stats(),
    };
    server.start();
    harness
}

fn store(entries: &[(RecordType, &str, RecordValue)]) -> Arc<RecordStore> {
    let store = Arc::new(RecordStore::new());
    for (rtype, domain, value) in entries {
        store.insert(*rtype, domain, value.clone());
    }
    store
}

fn query(id: u16, name: &str, rtype: WireType) -> Vec<u8> {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(Name::from_ascii(name).unwrap(), rtype));
    message.to_vec().unwrap()
}

async fn udp_exchange(server: SocketAddr, packet: &[u8]) -> Option<Vec<u8>> {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(packet, server).await.unwrap();

    let mut buf = vec![0u8; 4096];
    match tokio::time::timeout(Duration::from_millis(500), client.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => {
            buf.truncate(len);
            Some(buf)
        }
        _ => None,
    }
}

async fn ask(server: SocketAddr, name: &str, rtype: WireType) -> Message {
    let reply = udp_exchange(server, &query(0x4242, name, rtype))
        .await
        .expect("no reply");
    Message::from_vec(&reply).unwrap()
}

fn first_answer(message: &Message) -> String {
    message.answers()[0].data().unwrap().to_string()
}

fn run_local<F: std::future::Future<Output = ()>>(test: F) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    LocalSet::new().block_on(&rt, test);
}

#[test]
fn wildcard_scenario_over_udp() {
    run_local(async {
        let h = start(
            store(&[
                (RecordType::A, "*.thesprawl.org", RecordValue::literal("1.1.1.1")),
                (RecordType::A, "test.thesprawl.org", RecordValue::literal("100.100.100.100")),
            ]),
            FailurePolicy::Proxy,
        )
        .await;

        let exact = ask(h.udp, "test.thesprawl.org.", WireType::A).await;
        assert_eq!(first_answer(&exact), "100.100.100.100");
        assert!(exact.header().authoritative());
        assert!(exact.header().recursion_available());
        assert_eq!(exact.id(), 0x4242);
        assert_eq!(exact.queries()[0].name().to_ascii(), "test.thesprawl.org.");
        assert_eq!(exact.answers()[0].ttl(), 0);

        let wildcard = ask(h.udp, "zzz.thesprawl.org.", WireType::A).await;
        assert_eq!(first_answer(&wildcard), "1.1.1.1");

        let proxied = ask(h.udp, "thesprawl.org.", WireType::A).await;
        assert!(!proxied.header().authoritative());
        assert_eq!(first_answer(&proxied), "93.184.216.34");
    });
}

#[test]
fn unmatched_reply_is_relayed_verbatim() {
    run_local(async {
        let h = start(store(&[]), FailurePolicy::Proxy).await;
        let packet = query(7, "www.example.com.", WireType::AAAA);

        let reply = udp_exchange(h.udp, &packet).await.unwrap();

        assert_eq!(reply, upstream_reply(&packet));
        assert_eq!(h.stats.snapshot().proxied, 1);
    });
}

#[test]
fn tcp_serves_several_queries_per_connection() {
    run_local(async {
        let h = start(
            store(&[(RecordType::A, "*.thesprawl.org", RecordValue::literal("1.1.1.1"))]),
            FailurePolicy::Proxy,
        )
        .await;
        let mut stream = TcpStream::connect(h.tcp).await.unwrap();

        for (id, name, expected) in [
            (1, "a.thesprawl.org.", "1.1.1.1"),
            (2, "real.example.org.", "93.184.216.34"),
            (3, "b.thesprawl.org.", "1.1.1.1"),
        ] {
            write_frame(&mut stream, &query(id, name, WireType::A)).await.unwrap();
            let reply = read_frame(&mut stream).await.unwrap().unwrap();
            let message = Message::from_vec(&reply).unwrap();

            assert_eq!(message.id(), id);
            assert_eq!(first_answer(&message), expected);
        }
    });
}

#[test]
fn every_common_type_is_wire_compatible() {
    let cases = [
        (RecordType::A, WireType::A, "192.0.2.1"),
        (RecordType::Aaaa, WireType::AAAA, "2001:db8::1"),
        (RecordType::Ns, WireType::NS, "ns.fake.com"),
        (RecordType::Cname, WireType::CNAME, "www.fake.com"),
        (RecordType::Ptr, WireType::PTR, "host.fake.com"),
        (RecordType::Mx, WireType::MX, "mail.fake.com"),
        (RecordType::Txt, WireType::TXT, "fake message"),
        (RecordType::Soa, WireType::SOA, "ns.fake.com. hostmaster.fake.com. 1 10800 3600 604800 3600"),
        (RecordType::Srv, WireType::SRV, "10 20 5060 sip.fake.com."),
        (RecordType::Naptr, WireType::NAPTR, r#"100 10 "U" E2U+sip !^.*$!sip:x@fake.com! ."#),
        (RecordType::Caa, WireType::CAA, r#"0 issue "letsencrypt.org""#),
        (RecordType::Https, WireType::HTTPS, "1 . alpn=h2,h3 port=8443"),
    ];

    run_local(async move {
        let entries: Vec<(RecordType, &str, RecordValue)> = cases
            .iter()
            .map(|(rtype, _, value)| (*rtype, "*.fake.com", RecordValue::literal(*value)))
            .collect();
        let h = start(store(&entries), FailurePolicy::NoAnswer).await;

        for (rtype, wire_type, value) in cases {
            let message = ask(h.udp, "x.fake.com.", wire_type).await;

            assert_eq!(message.answers().len(), 1, "{rtype} {value}");
            assert_eq!(message.answers()[0].record_type(), wire_type, "{rtype}");
            assert!(message.header().authoritative(), "{rtype}");
        }
    });
}

#[test]
fn staged_file_round_trip_over_a_records() {
    let contents: Vec<u8> = (0..=254u8).rev().collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&contents).unwrap();
    let staging = RecordValue::Staged(FileStaging {
        file: file.path().to_path_buf(),
        chunk_size: None,
        response_format: None,
        response_prefix_pool: Vec::new(),
    });

    run_local(async move {
        let h = start(store(&[(RecordType::A, "*.wat.org", staging)]), FailurePolicy::Proxy).await;

        let mut reassembled = Vec::new();
        for index in 0.. {
            let message = ask(h.udp, &format!("lala{index}dayum.wat.org."), WireType::A).await;
            assert!(message.header().authoritative());
            let Some(answer) = message.answers().first() else {
                break;
            };
            match answer.data() {
                Some(RData::A(a)) => reassembled.extend_from_slice(&a.0.octets()),
                other => panic!("unexpected answer {other:?}"),
            }
        }

        assert_eq!(reassembled.len(), 256);
        assert_eq!(&reassembled[..255], &contents[..]);
        assert_eq!(reassembled[255], 0);
    });
}

#[test]
fn staged_txt_payload_fits_one_string() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0xAB; 600]).unwrap();
    let staging = RecordValue::Staged(FileStaging {
        file: file.path().to_path_buf(),
        chunk_size: None,
        response_format: Some("v=spf1 {prefix}{chunk} -all".into()),
        response_prefix_pool: vec!["include:".into()],
    });

    run_local(async move {
        let h = start(store(&[(RecordType::Txt, "*.brick.org", staging)]), FailurePolicy::Proxy).await;

        let message = ask(h.udp, "ns0.brick.org.", WireType::TXT).await;

        let Some(RData::TXT(txt)) = message.answers()[0].data() else {
            panic!("expected a TXT answer");
        };
        let strings = txt.txt_data();
        assert_eq!(strings.len(), 1);
        assert!(strings[0].len() <= 255);
        assert!(strings[0].starts_with(b"v=spf1 include:"));
        assert!(strings[0].ends_with(b" -all"));
    });
}

#[test]
fn malformed_packets_do_not_stop_the_server() {
    run_local(async {
        let h = start(
            store(&[(RecordType::A, "*", RecordValue::literal("10.0.0.1"))]),
            FailurePolicy::Proxy,
        )
        .await;

        assert!(udp_exchange(h.udp, &[0xde, 0xad, 0xbe, 0xef]).await.is_none());

        let message = ask(h.udp, "still.alive.org.", WireType::A).await;
        assert_eq!(first_answer(&message), "10.0.0.1");
        assert_eq!(h.stats.snapshot().dropped, 1);
    });
}

#[test]
fn synthesis_failure_without_proxy_sends_nothing() {
    run_local(async {
        let h = start(
            store(&[(RecordType::Mx, "*.broken.org", RecordValue::literal("a b c"))]),
            FailurePolicy::NoAnswer,
        )
        .await;

        let reply = udp_exchange(h.udp, &query(1, "x.broken.org.", WireType::MX)).await;

        assert!(reply.is_none());
    });
}

#[test]
fn runtime_changes_apply_without_restart() {
    run_local(async {
        let h = start(store(&[]), FailurePolicy::Proxy).await;

        let before = ask(h.udp, "new.thesprawl.org.", WireType::A).await;
        assert_eq!(first_answer(&before), "93.184.216.34");

        h.store.insert(RecordType::A, "new.thesprawl.org", RecordValue::literal("6.6.6.6"));
        let during = ask(h.udp, "new.thesprawl.org.", WireType::A).await;
        assert_eq!(first_answer(&during), "6.6.6.6");

        h.store.remove(RecordType::A, "new.thesprawl.org");
        let after = ask(h.udp, "new.thesprawl.org.", WireType::A).await;
        assert_eq!(first_answer(&after), "93.184.216.34");
    });
}

#[test]
fn any_query_returns_every_faked_type() {
    run_local(async {
        let h = start(
            store(&[
                (RecordType::A, "*.multi.org", RecordValue::literal("1.2.3.4")),
                (RecordType::Mx, "*.multi.org", RecordValue::literal("mail.multi.org")),
            ]),
            FailurePolicy::Proxy,
        )
        .await;

        let message = ask(h.udp, "x.multi.org.", WireType::ANY).await;

        let types: Vec<WireType> = message.answers().iter().map(|r| r.record_type()).collect();
        assert_eq!(types, vec![WireType::A, WireType::MX]);
    });
}

#[test]
fn hung_upstream_does_not_block_other_queries() {
    run_local(async {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = Upstream::udp("127.0.0.1", silent.local_addr().unwrap().port());
        let h = start_with(
            store(&[(RecordType::A, "*.thesprawl.org", RecordValue::literal("1.1.1.1"))]),
            FailurePolicy::Proxy,
            upstream,
            None,
        )
        .await;

        let waiting = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        waiting
            .send_to(&query(1, "real.example.org.", WireType::A), h.udp)
            .await
            .unwrap();

        // The relayed query reaches the upstream and stays outstanding.
        let mut buf = [0u8; 512];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), silent.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(len > 0);

        let over_udp = ask(h.udp, "a.thesprawl.org.", WireType::A).await;
        assert_eq!(first_answer(&over_udp), "1.1.1.1");

        let mut stream = TcpStream::connect(h.tcp).await.unwrap();
        write_frame(&mut stream, &query(2, "b.thesprawl.org.", WireType::A)).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_millis(500), read_frame(&mut stream))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first_answer(&Message::from_vec(&reply).unwrap()), "1.1.1.1");

        let outstanding =
            tokio::time::timeout(Duration::from_millis(100), waiting.recv_from(&mut buf)).await;
        assert!(outstanding.is_err());
        assert_eq!(h.stats.snapshot().cooked, 2);
        assert_eq!(h.stats.snapshot().proxied, 0);
    });
}

#[test]
fn refused_upstream_sends_nothing() {
    run_local(async {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let upstream = Upstream::tcp("127.0.0.1", closed.local_addr().unwrap().port());
        drop(closed);
        let h = start_with(store(&[]), FailurePolicy::Proxy, upstream, None).await;

        let reply = udp_exchange(h.udp, &query(5, "real.example.org.", WireType::A)).await;

        assert!(reply.is_none());
        assert_eq!(h.stats.snapshot().proxy_failures, 1);
        assert_eq!(h.stats.snapshot().proxied, 0);
    });
}
