//! Property-based tests for reply decoding
//!
//! 1. **Error text**: whenever a reply reports an error, it has error text
//! 2. **Leniency**: any mix of present, absent and `null` error members parses

use cipherise_proto::{EmptyReply, ErrorFields, ServerReply, parse};
use proptest::prelude::*;

fn member(name: &'static str, value: BoxedStrategy<String>) -> BoxedStrategy<Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(format!("\"{name}\": null"))),
        value.prop_map(move |v| Some(format!("\"{name}\": {v}"))),
    ]
    .boxed()
}

fn text() -> BoxedStrategy<String> {
    "[a-zA-Z ]{0,12}".prop_map(|s| format!("\"{s}\"")).boxed()
}

fn number() -> BoxedStrategy<String> {
    prop_oneof![Just(0i64), 1i64..1000].prop_map(|n| n.to_string()).boxed()
}

fn error_body() -> impl Strategy<Value = String> {
    (
        member("error", any::<bool>().prop_map(|b| b.to_string()).boxed()),
        member("error_code", number()),
        member("error_message", text()),
        member("logId", text()),
        member("enrolmentErrorCode", number()),
        member("enrolmentErrorMsg", text()),
        member("failReason", text()),
    )
        .prop_map(|(a, b, c, d, e, f, g)| {
            let members: Vec<String> = [a, b, c, d, e, f, g].into_iter().flatten().collect();
            format!("{{{}}}", members.join(", "))
        })
}

proptest! {
    #[test]
    fn prop_error_reply_always_has_text(body in error_body()) {
        let reply: EmptyReply = parse(body.as_bytes()).unwrap();
        let status: &ErrorFields = reply.error_fields();

        if status.has_error() {
            prop_assert!(!status.message().is_empty());
        }
    }

    #[test]
    fn prop_local_error_roundtrips_message(message in "[a-z]{1,20}") {
        let status = ErrorFields::from_message(message.clone());

        prop_assert!(status.has_error());
        prop_assert_eq!(status.message(), message.as_str());
    }
}
