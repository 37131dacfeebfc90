use std::io::{Cursor, Read, Write};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use wyrmhole_host::{
    pump_frames, Dispatch, HostFunctionTable, LoopConfig, MainLoop, Outbound, PluginBridge,
};
use wyrmhole_plugin::{AsyncCall, HostFunctions, Plugin, PluginError, PluginRegistry};
use wyrmhole_protocol::{
    encode_frame, parse_envelope, Chunker, ColonyId, Envelope, FrameReader, Message, MessageId,
    Reassembler,
};

const MIMETYPE: &str = "application/x-shout";

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Stdin stand-in that blocks until the test hands it more bytes.
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    current: Cursor<Vec<u8>>,
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let n = self.current.read(out)?;
            if n > 0 {
                return Ok(n);
            }
            match self.rx.recv() {
                Ok(bytes) => self.current = Cursor::new(bytes),
                Err(_) => return Ok(0),
            }
        }
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Answers every command with its payload uppercased, from an async call.
struct Shout {
    host: Option<Arc<dyn HostFunctions>>,
    after_reply: Hook,
}

impl Plugin for Shout {
    fn name(&self) -> &str {
        "Shout"
    }

    fn initialize(&mut self, host: Arc<dyn HostFunctions>) -> Result<(), PluginError> {
        self.host = Some(host);
        Ok(())
    }

    fn on_command(
        &mut self,
        colony_id: ColonyId,
        msg_id: MessageId,
        payload: String,
    ) -> Result<(), PluginError> {
        let host = self
            .host
            .clone()
            .ok_or_else(|| PluginError::Call("not initialized".into()))?;
        let after_reply = Arc::clone(&self.after_reply);
        let scheduler = Arc::clone(&host);
        scheduler
            .schedule_call(AsyncCall::new(move || {
                host.send_response(colony_id, msg_id, &payload.to_uppercase())
                    .unwrap();
                after_reply();
            }))
            .map_err(|err| PluginError::Call(err.to_string()))
    }

    fn on_response(&mut self, _: ColonyId, _: MessageId, _: String) -> Result<(), PluginError> {
        Ok(())
    }
}

struct Harness {
    main_loop: MainLoop,
    bridge: PluginBridge,
    output: SharedBuffer,
}

fn harness(chunk_size: usize, after_reply: Hook) -> Harness {
    let mut registry = PluginRegistry::new();
    registry.register(MIMETYPE, move || {
        Ok(Box::new(Shout {
            host: None,
            after_reply: Arc::clone(&after_reply),
        }) as Box<dyn Plugin>)
    });

    let output = SharedBuffer::default();
    let outbound = Arc::new(Outbound::new(output.clone(), Chunker::new(chunk_size)));
    let main_loop = MainLoop::new(LoopConfig::default());
    let host = Arc::new(HostFunctionTable::new(
        Arc::clone(&outbound),
        main_loop.handle(),
    ));
    let bridge = PluginBridge::new(Box::new(registry), host, outbound);
    Harness {
        main_loop,
        bridge,
        output,
    }
}

fn chunk(id: u32, c: u32, n: u32, msg: &str) -> Vec<u8> {
    let doc = serde_json::json!({
        "c": c, "n": n, "type": "cmd", "colonyId": 5, "cmdId": id, "msg": msg,
    });
    encode_frame(&doc.to_string()).unwrap()
}

fn create_frame() -> Vec<u8> {
    encode_frame(&serde_json::json!({"cmd": "create", "mimetype": MIMETYPE}).to_string()).unwrap()
}

/// Splits the host's output into acks and reassembled chunked messages.
fn decode(output: &SharedBuffer) -> (Vec<serde_json::Value>, Vec<Message>) {
    let bytes = output.0.lock().unwrap().clone();
    let mut reader = FrameReader::new(Cursor::new(bytes), usize::MAX);
    let mut reassembler = Reassembler::new();
    let (mut acks, mut messages) = (Vec::new(), Vec::new());
    while let Some(text) = reader.read_frame().unwrap() {
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        if value.get("status").is_some() {
            acks.push(value);
            continue;
        }
        let Envelope::Chunk(chunk) = parse_envelope(&text).unwrap() else {
            panic!("host sent a create");
        };
        if let Some(message) = reassembler.accept(chunk).unwrap() {
            messages.push(message);
        }
    }
    (acks, messages)
}

#[test]
fn chunked_command_round_trips_through_the_plugin() {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    // Closing stdin after the reply is written makes the reader request exit.
    let stdin = Arc::new(Mutex::new(Some(tx.clone())));
    let close_stdin = Arc::clone(&stdin);
    let Harness {
        main_loop,
        mut bridge,
        output,
    } = harness(
        3,
        Arc::new(move || {
            close_stdin.lock().unwrap().take();
        }),
    );
    drop(tx);
    let handle = main_loop.handle();

    let reader = {
        let handle = handle.clone();
        thread::spawn(move || {
            let frames = FrameReader::new(
                ChannelReader {
                    rx,
                    current: Cursor::new(Vec::new()),
                },
                1024,
            );
            pump_frames(frames, &handle)
        })
    };

    {
        let guard = stdin.lock().unwrap();
        let tx = guard.as_ref().unwrap();
        // Chunks arrive out of order; the reply is chunked at 3 bytes.
        tx.send(create_frame()).unwrap();
        tx.send(chunk(11, 3, 3, "orld")).unwrap();
        tx.send(chunk(11, 3, 1, "hello")).unwrap();
        tx.send(chunk(11, 3, 2, " w")).unwrap();
    }

    let stats = main_loop.run(&mut bridge);
    let frames_read = reader.join().unwrap();
    bridge.shutdown();

    assert_eq!(frames_read, 4);
    assert_eq!(stats.messages_dispatched, 2);
    assert_eq!(stats.calls_run, 1);
    assert_eq!(handle.pending_chunks(), 0);

    let (acks, replies) = decode(&output);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0]["status"], "success");
    assert_eq!(acks[0]["plugin"], "Shout");
    assert_eq!(
        replies,
        vec![Message::Response {
            colony_id: ColonyId(5),
            msg_id: MessageId(11),
            payload: "HELLO WORLD".into(),
        }]
    );
}

#[test]
fn malformed_frames_are_acked_without_stopping_the_loop() {
    let Harness {
        main_loop,
        mut bridge,
        output,
    } = harness(1024, Arc::new(|| {}));
    let handle = main_loop.handle();

    handle.message_in(r#"{"cmd":"bogus"}"#);
    handle.message_in(r#"{"cmd":"create"}"#);
    handle.message_in("not json");
    handle.message_in(r#"{"cmdId":1,"c":1,"msg":"hi"}"#);

    let exit = handle.clone();
    let mut seen = 0;
    main_loop.run(&mut |message: Message| {
        bridge.dispatch(message);
        seen += 1;
        if seen == 4 {
            exit.request_exit();
        }
    });

    let (acks, replies) = decode(&output);
    assert!(replies.is_empty());
    let statuses: Vec<_> = acks.iter().map(|a| a["status"].clone()).collect();
    assert_eq!(statuses, vec!["error"; 4]);
    assert!(acks[0]["message"].as_str().unwrap().contains("bogus"));
    assert!(acks[1]["message"].as_str().unwrap().contains("mimetype"));
    assert_eq!(acks[3]["message"], "No plugin loaded");
}
