use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio_test::{assert_err, assert_ok};

use lifx_lan::network::{Binder, Transport};
use lifx_lan::protocol::{decode_frame, encode_frame, Frame, Label, ReplyMode};
use lifx_lan::{ClientConfig, Error, LanClient, MacAddr, Message, MessageKind, Power, Result};

/// One simulated bulb
struct Bulb {
    addr: SocketAddr,
    label: String,
    power: u16,
    /// Requests to silently drop before answering
    drop_next: u32,
}

/// A LAN of simulated bulbs reachable through the public transport seam
#[derive(Clone, Default)]
struct SimulatedLan {
    bulbs: Arc<Mutex<HashMap<MacAddr, Bulb>>>,
    datagrams: Arc<Mutex<usize>>,
}

impl SimulatedLan {
    fn with_bulbs(count: u8) -> Self {
        let lan = SimulatedLan::default();
        for n in 1..=count {
            lan.bulbs.lock().unwrap().insert(
                mac(n),
                Bulb {
                    addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)), 56700),
                    label: format!("bulb {n}"),
                    power: 0,
                    drop_next: 0,
                },
            );
        }
        lan
    }

    fn datagrams(&self) -> usize {
        *self.datagrams.lock().unwrap()
    }

    fn answer(&self, datagram: &[u8], unicast: Option<SocketAddr>) -> Vec<(Bytes, SocketAddr)> {
        *self.datagrams.lock().unwrap() += 1;
        let request = decode_frame(datagram).unwrap();
        let mut bulbs = self.bulbs.lock().unwrap();
        let mut replies = Vec::new();

        for (mac, bulb) in bulbs.iter_mut() {
            let addressed = match unicast {
                None => request.header.tagged,
                Some(addr) => addr == bulb.addr && request.target() == *mac,
            };
            if !addressed {
                continue;
            }
            if bulb.drop_next > 0 {
                bulb.drop_next -= 1;
                continue;
            }

            // unrelated chatter every device emits
            replies.push((frame(&request, *mac, Message::Unknown { message_type: 9999, payload: Bytes::new() }), bulb.addr));

            let state = match &request.message {
                Message::GetService {} => Some(Message::StateService { service: 1, port: 56700 }),
                Message::GetLabel {} => Some(Message::StateLabel { label: Label::new(bulb.label.as_str()).unwrap() }),
                Message::GetPower {} => Some(Message::StatePower { power_level: bulb.power }),
                Message::SetLabel { label } => {
                    bulb.label = label.to_string();
                    None
                }
                Message::SetPower { power_level } => {
                    bulb.power = *power_level;
                    None
                }
                _ => None,
            };
            if let Some(state) = state.filter(|_| request.header.res_required) {
                replies.push((frame(&request, *mac, state), bulb.addr));
            }
            if request.header.ack_required {
                replies.push((frame(&request, *mac, Message::Acknowledgement {}), bulb.addr));
            }
        }
        replies
    }
}

fn mac(n: u8) -> MacAddr {
    MacAddr([0xd0, 0x73, 0xd5, 0x10, 0x20, n])
}

fn frame(request: &Frame, from: MacAddr, message: Message) -> Bytes {
    let reply = Frame::request(request.source(), from, request.header.sequence, ReplyMode::FireAndForget, message);
    let mut buf = BytesMut::new();
    encode_frame(&reply, &mut buf).unwrap();
    buf.freeze()
}

struct SimulatedSocket {
    lan: SimulatedLan,
    inbox: VecDeque<(Bytes, SocketAddr)>,
}

#[async_trait]
impl Transport for SimulatedSocket {
    async fn send_broadcast(&mut self, datagram: &[u8]) -> Result<()> {
        let replies = self.lan.answer(datagram, None);
        self.inbox.extend(replies);
        Ok(())
    }

    async fn send_to(&mut self, datagram: &[u8], addr: SocketAddr) -> Result<()> {
        let replies = self.lan.answer(datagram, Some(addr));
        self.inbox.extend(replies);
        Ok(())
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<(Bytes, SocketAddr)>> {
        if let Some(reply) = self.inbox.pop_front() {
            return Ok(Some(reply));
        }
        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.inbox.clear();
        Ok(())
    }
}

#[async_trait]
impl Binder for SimulatedLan {
    async fn bind(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SimulatedSocket {
            lan: self.clone(),
            inbox: VecDeque::new(),
        }))
    }
}

fn config() -> ClientConfig {
    ClientConfig {
        timeout: Duration::from_millis(200),
        discovery_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_discover_then_control() {
    let lan = SimulatedLan::with_bulbs(3);
    let client = LanClient::with_binder(config(), lan.clone()).unwrap();

    let devices = client.discover().await.unwrap();
    assert_eq!(devices.iter().map(|d| d.mac).collect::<Vec<_>>(), vec![mac(1), mac(2), mac(3)]);

    let bulb = devices[1];
    assert_eq!(client.get_label(&bulb).await.unwrap(), "bulb 2");
    assert_ok!(client.set_label(&bulb, "hallway").await);
    assert_eq!(client.get_label(&bulb).await.unwrap(), "hallway");

    assert_ok!(client.set_power(&bulb, Power::On, false).await);
    assert_eq!(client.get_power(&bulb).await.unwrap(), Power::On);
    assert_eq!(client.get_power(&devices[0]).await.unwrap(), Power::Off);
}

#[tokio::test(start_paused = true)]
async fn test_lost_request_is_retried() {
    let lan = SimulatedLan::with_bulbs(1);
    let client = LanClient::with_binder(config(), lan.clone()).unwrap();
    let bulb = client.discover_with(Duration::from_millis(100), 1).await.unwrap()[0];
    let before = lan.datagrams();

    lan.bulbs.lock().unwrap().get_mut(&mac(1)).unwrap().drop_next = 2;
    client.set_power(&bulb, Power::On, false).await.unwrap();
    assert_eq!(lan.datagrams() - before, 3);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_bulb_reports_no_response() {
    let lan = SimulatedLan::with_bulbs(1);
    let client = LanClient::with_binder(config(), lan.clone()).unwrap();
    let bulb = client.discover_with(Duration::from_millis(100), 1).await.unwrap()[0];

    lan.bulbs.lock().unwrap().get_mut(&mac(1)).unwrap().drop_next = u32::MAX;
    let started = tokio::time::Instant::now();
    let err = assert_err!(
        client
            .send_with_response(&bulb, Message::GetLabel {}, &[MessageKind::StateLabel])
            .await
    );

    assert!(matches!(err, Error::NoResponse { attempts: 5, .. }));
    assert!(started.elapsed() <= Duration::from_millis(5 * 200 + 10));
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_power_to_every_bulb() {
    let lan = SimulatedLan::with_bulbs(4);
    let client = LanClient::with_binder(config(), lan.clone()).unwrap();
    client.discover().await.unwrap();

    client.set_power_all(Power::On, false).await.unwrap();
    let powers = client.get_power_all().await.unwrap();
    assert_eq!(powers.len(), 4);
    assert!(powers.iter().all(|(_, power)| *power == Power::On));
}
