#![no_main]

use libfuzzer_sys::fuzz_target;
use talk_proto::try_parse_response_head;

fuzz_target!(|data: &[u8]| {
    let whole = try_parse_response_head(data);

    if let Ok(Some((input_used, _))) = &whole {
        assert!(*input_used <= data.len());
    }

    // Every prefix is either incomplete or parses to the same head.
    for i in 0..data.len() {
        match try_parse_response_head(&data[..i]) {
            Ok(None) => {}
            Ok(Some(prefix)) => {
                if let Ok(Some(full)) = &whole {
                    assert_eq!(&prefix, full);
                }
            }
            Err(_) => {}
        }
    }
});
