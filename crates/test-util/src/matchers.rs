// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! This module contains a collection of matchers

pub use googletest::matchers::*;

pub use json::json_decoded;

mod json {
    use std::fmt::Debug;
    use std::marker::PhantomData;

    use googletest::matcher::{Matcher, MatcherResult};
    use serde_json::Value;

    struct JsonDecodeMatcher<InnerMatcher, B: ?Sized>(InnerMatcher, PhantomData<B>);

    impl<B: AsRef<[u8]> + Debug + ?Sized, InnerMatcher: Matcher<ActualT = Value>> Matcher
        for JsonDecodeMatcher<InnerMatcher, B>
    {
        type ActualT = B;

        fn matches(&self, actual: &Self::ActualT) -> MatcherResult {
            if let Ok(value) = serde_json::from_slice::<Value>(actual.as_ref()) {
                self.0.matches(&value)
            } else {
                MatcherResult::NoMatch
            }
        }

        fn describe(&self, matcher_result: MatcherResult) -> String {
            match matcher_result {
                MatcherResult::Match => {
                    format!(
                        "can be decoded from json which {:?}",
                        self.0.describe(MatcherResult::Match)
                    )
                }
                MatcherResult::NoMatch => "cannot be decoded from json".to_string(),
            }
        }
    }

    /// Decode bytes (e.g. a response body) as JSON and match the decoded value.
    pub fn json_decoded<B: AsRef<[u8]> + Debug + ?Sized>(
        inner: impl Matcher<ActualT = Value>,
    ) -> impl Matcher<ActualT = B> {
        JsonDecodeMatcher(inner, Default::default())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        use googletest::{assert_that, matchers::eq};
        use serde_json::json;

        #[test]
        fn decode_body() {
            let expected = json!({"test": "yes"});

            assert_that!(
                serde_json::to_vec(&expected).unwrap(),
                json_decoded(eq(expected.clone()))
            );
            assert_that!(
                b"{\"test\":\"yes\"}".as_slice(),
                json_decoded(eq(expected))
            );
        }
    }
}
