#![cfg(feature = "hardware")]

use std::time::Duration;

use carport_hardware::SerialPortLink;
use carport_traits::SerialLink;

// NOTE: needs a rangefinder wired to /dev/serial0; on other machines the open
// fails and the test only checks that the failure is reported, not panicked.

#[test]
fn open_reports_or_succeeds() {
    let link = SerialPortLink::new(Duration::from_millis(50));
    match link.open("/dev/serial0", 115_200) {
        Ok((mut source, mut sink)) => {
            sink.write(&[0x5A, 0x04, 0x01, 0x00]).expect("write");
            sink.flush().expect("flush");
            let mut buf = [0u8; 16];
            let _ = source.read(&mut buf).expect("read");
        }
        Err(e) => assert!(e.to_string().contains("/dev/serial0")),
    }
}
