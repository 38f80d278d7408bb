use super::{Check, CheckOutcome};
use crate::engine::model::Response;
use crate::error::{CheckError, ErrorCode};
use serde::{Deserialize, Serialize};

macro_rules! opaque_check {
    ($name:ident, $tag:literal, $code:expr) => {
        #[doc = concat!(
            "Opaque external collaborator: registers and round-trips like any ",
            "other Check but always reports `CheckError::Unsupported` at execute ",
            "time — a real implementation lives outside this engine."
        )]
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct $name;

        impl Check for $name {
            fn execute(&self, _response: &Response) -> CheckOutcome {
                CheckOutcome::Error(CheckError::Unsupported($code))
            }

            fn name(&self) -> &'static str {
                $tag
            }
        }
    };
}

opaque_check!(Resilience, "Resilience", ErrorCode::CHECK_STATUS);
opaque_check!(Screenshot, "Screenshot", ErrorCode::CHECK_IMAGE);
opaque_check!(RenderedHTML, "RenderedHTML", ErrorCode::CHECK_HTML);
opaque_check!(RenderingTime, "RenderingTime", ErrorCode::CHECK_RESPONSE_TIME);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::ok;

    #[test]
    fn opaque_checks_report_unsupported() {
        for outcome in [
            Resilience.execute(&ok(b"")),
            Screenshot.execute(&ok(b"")),
            RenderedHTML.execute(&ok(b"")),
            RenderingTime.execute(&ok(b"")),
        ] {
            assert!(matches!(outcome, CheckOutcome::Error(CheckError::Unsupported(_))));
        }
    }
}
