// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    validation = { ErrorKind::Validation, 400 },
    precondition = { ErrorKind::PreconditionFailed, 409 },
    not_found = { ErrorKind::NotFound, 404 },
    adapter = { ErrorKind::Adapter, 502 },
    io = { ErrorKind::Io, 500 },
    unavailable = { ErrorKind::Unavailable, 503 },
)]
fn status_mapping(kind: ErrorKind, expected: u16) {
    assert_eq!(status_for(kind).as_u16(), expected);
}

#[test]
fn response_body_is_kind_message() {
    let response = ApiError(GatewayError::validation("bad title")).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
