use rmi_comms::handshake;
use std::thread;

#[test]
fn client_and_server_exchange_endpoint_metadata_over_a_handshake() {
    let uri = "ipc:///tmp/rmi-comms-it-handshake";

    let server = thread::spawn(move || {
        handshake::respond::<String, (bool, String)>(uri, 1024, |service_name: String| {
            (service_name == "sum", format!("tcp://127.0.0.1:6000/{service_name}"))
        })
        .expect("server side of handshake failed");
    });

    // Give the responder a moment to bind before the initiator connects.
    thread::sleep(std::time::Duration::from_millis(50));

    let (found, endpoint): (bool, String) =
        handshake::initiate(uri, &"sum".to_string(), 1024).expect("client side of handshake failed");

    assert!(found);
    assert_eq!(endpoint, "tcp://127.0.0.1:6000/sum");

    server.join().expect("server thread panicked");
}
