//! Scripted stand-in for a gateway, talking over an in-memory duplex pipe.

#![allow(dead_code)]

use std::time::Duration;

use selve_gateway::protocol::*;
use selve_gateway::{Gateway, GatewayConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

/// Config with short timers for tests.
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        name: "fake".to_string(),
        command_timeout_ms: 1_000,
        read_timeout_ms: 20,
        shutdown_grace_ms: 100,
        ..GatewayConfig::default()
    }
}

pub async fn connect() -> (Gateway, FakeGateway) {
    connect_with(test_config()).await
}

pub async fn connect_with(config: GatewayConfig) -> (Gateway, FakeGateway) {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let gateway = Gateway::connect(local, config).await.unwrap();
    (gateway, FakeGateway::new(remote))
}

/// The gateway side of the pipe.
pub struct FakeGateway {
    stream: DuplexStream,
    codec: FrameCodec,
}

impl FakeGateway {
    pub fn new(stream: DuplexStream) -> Self {
        FakeGateway {
            stream,
            codec: FrameCodec::new(),
        }
    }

    /// Next call written by the engine.
    pub async fn next_call(&mut self) -> MethodCall {
        tokio::time::timeout(Duration::from_secs(2), self.read_call())
            .await
            .expect("engine wrote no call")
    }

    async fn read_call(&mut self) -> MethodCall {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(frame) = self.codec.decode_next() {
                match frame.expect("engine wrote a malformed frame") {
                    Frame::Call(call) => return call,
                    other => panic!("engine wrote a non-call frame: {:?}", other),
                }
            }
            let n = self.stream.read(&mut buf).await.expect("read failed");
            assert!(n > 0, "engine closed the pipe");
            self.codec.push(&buf[..n]);
        }
    }

    /// True if the engine writes nothing within `window`.
    pub async fn is_silent(&mut self, window: Duration) -> bool {
        if self.codec.buffered_len() > 0 {
            return false;
        }
        let mut buf = [0u8; 64];
        tokio::time::timeout(window, self.stream.read(&mut buf)).await.is_err()
    }

    pub async fn respond(&mut self, method: Method, values: Vec<Value>) {
        let frame = MethodResponse::new(method, values).encode().unwrap();
        self.send_raw(&frame).await;
    }

    pub async fn fault(&mut self, code: FaultCode) {
        let frame = GatewayFault {
            code,
            message: code.message().to_string(),
        }
        .encode();
        self.send_raw(&frame).await;
    }

    pub async fn event(&mut self, method: Method, values: Vec<Value>) {
        let frame = MethodCall { method, params: values }.encode().unwrap();
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Answer calls with `handler` until the engine closes the pipe.
    pub fn serve<F>(mut self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&MethodCall) -> Reply + Send + 'static,
    {
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                while let Some(frame) = self.codec.decode_next() {
                    let Ok(Frame::Call(call)) = frame else { continue };
                    match handler(&call) {
                        Reply::Values(values) => self.respond(call.method, values).await,
                        Reply::Fault(code) => self.fault(code).await,
                        Reply::Silent => {}
                    }
                }
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => self.codec.push(&buf[..n]),
                }
            }
        })
    }
}

/// How a served call is answered.
pub enum Reply {
    Values(Vec<Value>),
    Fault(FaultCode),
    Silent,
}

pub fn executed() -> Reply {
    Reply::Values(vec![Value::Int(1)])
}

pub fn mask(ids: &[u8]) -> Value {
    Value::from(IdMask::from_ids(ids.iter().copied()).unwrap())
}

/// `device.getInfo` values.
pub fn device_info(id: u8, name: &str) -> Vec<Value> {
    vec![
        Value::Str(name.into()),
        Value::Int(id.into()),
        Value::Int(0x4000 + i64::from(id)),
        Value::Int(DeviceType::Shutter.ordinal()),
        Value::Int(DeviceState::Used.ordinal()),
    ]
}

/// `device.getValues` / `event.device` values, position as a raw value.
pub fn device_values(id: u8, name: &str, movement: MovementState, raw_position: i64) -> Vec<Value> {
    vec![
        Value::Str(name.into()),
        Value::Int(id.into()),
        Value::Int(movement.ordinal()),
        Value::Int(raw_position),
        Value::Int(raw_position),
        Value::Int(0),
        Value::Int(DayMode::Day.ordinal()),
    ]
}

pub fn device_event(id: u8, movement: MovementState, raw_position: i64) -> Vec<Value> {
    let mut values = device_values(id, "", movement, raw_position);
    values.push(Value::Int(DeviceType::Shutter.ordinal()));
    values
}

pub fn group_record(id: u8, name: &str, members: &[u8]) -> Vec<Value> {
    vec![Value::Str(name.into()), Value::Int(id.into()), mask(members)]
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
