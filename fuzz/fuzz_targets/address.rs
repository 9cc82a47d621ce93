#![no_main]

use courier_common::DeliveryRequest;
use courier_delivery::validator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(address) = std::str::from_utf8(data) {
        let request = DeliveryRequest::new(address);
        assert_eq!(
            validator::validate(&request).is_ok(),
            validator::is_valid_address(address)
        );
    }
});
