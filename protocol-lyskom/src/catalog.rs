//! The call catalogue: data-only tables for RPCs, asynchronous messages,
//! error codes and aux-item tags.
//!
//! Adding a call is a data change: declare its request and response schemas
//! and append a descriptor to [`RPCS`]. Nothing in the dispatch machinery
//! depends on any particular entry being present.
//!
//! Field names are the protocol's own, camel-cased.

use crate::schema::Schema;

/// One remote procedure: wire number plus request and response schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcDescriptor {
    pub name: &'static str,
    pub number: u32,
    pub request: Schema,
    pub response: Schema,
}

/// One asynchronous message: wire number plus payload schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncDescriptor {
    pub name: &'static str,
    pub number: u32,
    pub schema: Schema,
}

// ── Shared field types ──────────────────────────────────────────────────

pub const PERSONAL_FLAGS: Schema = Schema::Bitstring {
    flags: &["unreadIsSecret"],
    width: 8,
};

pub const AUX_ITEM_FLAGS: Schema = Schema::Bitstring {
    flags: &["deleted", "inherit", "secret", "hideCreator", "dontGarb"],
    width: 8,
};

pub const CONF_TYPE: Schema = Schema::Bitstring {
    flags: &["rdProt", "original", "secret", "letterbox"],
    width: 4,
};

pub const EXTENDED_CONF_TYPE: Schema = Schema::Bitstring {
    flags: &[
        "rdProt",
        "original",
        "secret",
        "letterbox",
        "allowAnonymous",
        "forbidSecret",
    ],
    width: 8,
};

pub const SESSION_FLAGS: Schema = Schema::Bitstring {
    flags: &["invisible", "userActiveUsed", "userAbsent"],
    width: 8,
};

pub const MEMBERSHIP_TYPE: Schema = Schema::Bitstring {
    flags: &["invitation", "passive", "secret", "passiveMessageInvert"],
    width: 8,
};

pub const PRIV_BITS: Schema = Schema::Bitstring {
    flags: &[
        "wheel",
        "admin",
        "statistic",
        "createPers",
        "createConf",
        "changeName",
    ],
    width: 16,
};

pub const TIME: Schema = Schema::Structure(&[
    ("seconds", Schema::Int32),
    ("minutes", Schema::Int32),
    ("hours", Schema::Int32),
    ("day", Schema::Int32),
    ("month", Schema::Int32),
    ("year", Schema::Int32),
    ("dayOfWeek", Schema::Int32),
    ("dayOfYear", Schema::Int32),
    ("isDst", Schema::Bool),
]);

pub const CONF_Z_INFO: Schema = Schema::Structure(&[
    ("name", Schema::String),
    ("type", CONF_TYPE),
    ("confNo", Schema::Int32),
]);

pub const AUX_ITEM_INPUT: Schema = Schema::Structure(&[
    ("tag", Schema::Int32),
    ("flags", AUX_ITEM_FLAGS),
    ("inheritLimit", Schema::Int32),
    ("data", Schema::String),
]);

pub const AUX_ITEM: Schema = Schema::Structure(&[
    ("auxNo", Schema::Int32),
    ("tag", Schema::Int32),
    ("creator", Schema::Int32),
    ("createdAt", TIME),
    ("flags", AUX_ITEM_FLAGS),
    ("inheritLimit", Schema::Int32),
    ("data", Schema::String),
]);

/// Misc-info entries in requests are selector/value pairs; every selector a
/// client sends (recipients, comment and footnote links) takes a number.
pub const MISC_INFO: Schema = Schema::Structure(&[
    ("type", Schema::Int32),
    ("data", Schema::Int32),
]);

pub const DYNAMIC_SESSION_INFO: Schema = Schema::Structure(&[
    ("session", Schema::Int32),
    ("person", Schema::Int32),
    ("workingConference", Schema::Int32),
    ("idleTime", Schema::Int32),
    ("flags", SESSION_FLAGS),
    ("whatAmIDoing", Schema::String),
]);

pub const UCONFERENCE: Schema = Schema::Structure(&[
    ("name", Schema::String),
    ("type", EXTENDED_CONF_TYPE),
    ("highestLocalNo", Schema::Int32),
    ("nice", Schema::Int32),
]);

pub const MARK: Schema = Schema::Structure(&[
    ("textNo", Schema::Int32),
    ("type", Schema::Int32),
]);

pub const VERSION_INFO: Schema = Schema::Structure(&[
    ("protocolVersion", Schema::Int32),
    ("serverSoftware", Schema::String),
    ("softwareVersion", Schema::String),
]);

/// The fixed payload of a `%` error reply.
pub const ERROR_REPLY: Schema = Schema::Structure(&[
    ("errorCode", Schema::Int32),
    ("errorStatus", Schema::Int32),
]);

const INT32_ARRAY: Schema = Schema::Array(&Schema::Int32);

// ── RPC table ───────────────────────────────────────────────────────────

macro_rules! rpc {
    ($name:literal, $number:literal, $request:expr, $response:expr) => {
        RpcDescriptor {
            name: $name,
            number: $number,
            request: $request,
            response: $response,
        }
    };
}

/// All known remote procedures, in wire-number order.
pub const RPCS: &[RpcDescriptor] = &[
    rpc!("logout", 1, Schema::Empty, Schema::Empty),
    rpc!(
        "change-conference",
        2,
        Schema::Structure(&[("confNo", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "change-name",
        3,
        Schema::Structure(&[("confNo", Schema::Int32), ("newName", Schema::String)]),
        Schema::Empty
    ),
    rpc!(
        "change-what-i-am-doing",
        4,
        Schema::Structure(&[("what", Schema::String)]),
        Schema::Empty
    ),
    rpc!(
        "set-priv-bits",
        7,
        Schema::Structure(&[("person", Schema::Int32), ("privileges", PRIV_BITS)]),
        Schema::Empty
    ),
    rpc!(
        "set-passwd",
        8,
        Schema::Structure(&[
            ("person", Schema::Int32),
            ("oldPwd", Schema::String),
            ("newPwd", Schema::String),
        ]),
        Schema::Empty
    ),
    rpc!(
        "delete-conf",
        11,
        Schema::Structure(&[("conf", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "sub-member",
        15,
        Schema::Structure(&[("confNo", Schema::Int32), ("persNo", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "set-presentation",
        16,
        Schema::Structure(&[("confNo", Schema::Int32), ("textNo", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "set-supervisor",
        18,
        Schema::Structure(&[("confNo", Schema::Int32), ("admin", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "set-permitted-submitters",
        19,
        Schema::Structure(&[("confNo", Schema::Int32), ("permSub", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "set-super-conf",
        20,
        Schema::Structure(&[("confNo", Schema::Int32), ("superConf", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "set-conf-type",
        21,
        Schema::Structure(&[("confNo", Schema::Int32), ("type", EXTENDED_CONF_TYPE)]),
        Schema::Empty
    ),
    rpc!("get-marks", 23, Schema::Empty, Schema::Array(&MARK)),
    rpc!(
        "get-text",
        25,
        Schema::Structure(&[
            ("text", Schema::Int32),
            ("startChar", Schema::Int32),
            ("endChar", Schema::Int32),
        ]),
        Schema::String
    ),
    rpc!(
        "mark-as-read",
        27,
        Schema::Structure(&[("conference", Schema::Int32), ("text", INT32_ARRAY)]),
        Schema::Empty
    ),
    rpc!(
        "delete-text",
        29,
        Schema::Structure(&[("text", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "add-recipient",
        30,
        Schema::Structure(&[
            ("textNo", Schema::Int32),
            ("confNo", Schema::Int32),
            ("recptType", Schema::Int32),
        ]),
        Schema::Empty
    ),
    rpc!(
        "sub-recipient",
        31,
        Schema::Structure(&[("textNo", Schema::Int32), ("confNo", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "add-comment",
        32,
        Schema::Structure(&[("textNo", Schema::Int32), ("commentTo", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "sub-comment",
        33,
        Schema::Structure(&[("textNo", Schema::Int32), ("commentTo", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!("get-time", 35, Schema::Empty, TIME),
    rpc!(
        "set-unread",
        40,
        Schema::Structure(&[("confNo", Schema::Int32), ("noOfUnread", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "set-motd-of-lyskom",
        41,
        Schema::Structure(&[("textNo", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "enable",
        42,
        Schema::Structure(&[("level", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!("sync-kom", 43, Schema::Empty, Schema::Empty),
    rpc!(
        "shutdown-kom",
        44,
        Schema::Structure(&[("exitVal", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "get-unread-confs",
        52,
        Schema::Structure(&[("persNo", Schema::Int32)]),
        INT32_ARRAY
    ),
    rpc!(
        "send-message",
        53,
        Schema::Structure(&[("recipient", Schema::Int32), ("message", Schema::String)]),
        Schema::Empty
    ),
    rpc!(
        "disconnect",
        55,
        Schema::Structure(&[("sessionNo", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!("who-am-i", 56, Schema::Empty, Schema::Int32),
    rpc!(
        "set-user-area",
        57,
        Schema::Structure(&[("persNo", Schema::Int32), ("userArea", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "get-last-text",
        58,
        Schema::Structure(&[("before", TIME)]),
        Schema::Int32
    ),
    rpc!(
        "find-next-text-no",
        60,
        Schema::Structure(&[("start", Schema::Int32)]),
        Schema::Int32
    ),
    rpc!(
        "find-previous-text-no",
        61,
        Schema::Structure(&[("start", Schema::Int32)]),
        Schema::Int32
    ),
    rpc!(
        "login",
        62,
        Schema::Structure(&[
            ("person", Schema::Int32),
            ("passwd", Schema::String),
            ("invisible", Schema::Bool),
        ]),
        Schema::Empty
    ),
    rpc!(
        "set-client-version",
        69,
        Schema::Structure(&[
            ("clientName", Schema::String),
            ("clientVersion", Schema::String),
        ]),
        Schema::Empty
    ),
    rpc!(
        "get-client-name",
        70,
        Schema::Structure(&[("session", Schema::Int32)]),
        Schema::String
    ),
    rpc!(
        "get-client-version",
        71,
        Schema::Structure(&[("session", Schema::Int32)]),
        Schema::String
    ),
    rpc!(
        "mark-text",
        72,
        Schema::Structure(&[("text", Schema::Int32), ("markType", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "unmark-text",
        73,
        Schema::Structure(&[("text", Schema::Int32)]),
        Schema::Empty
    ),
    rpc!(
        "re-z-lookup",
        74,
        Schema::Structure(&[
            ("regexp", Schema::String),
            ("wantPersons", Schema::Bool),
            ("wantConfs", Schema::Bool),
        ]),
        Schema::Array(&CONF_Z_INFO)
    ),
    rpc!("get-version-info", 75, Schema::Empty, VERSION_INFO),
    rpc!(
        "lookup-z-name",
        76,
        Schema::Structure(&[
            ("name", Schema::String),
            ("wantPers", Schema::Bool),
            ("wantConfs", Schema::Bool),
        ]),
        Schema::Array(&CONF_Z_INFO)
    ),
    rpc!(
        "set-connection-time-format",
        77,
        Schema::Structure(&[("useUtc", Schema::Bool)]),
        Schema::Empty
    ),
    rpc!(
        "get-uconf-stat",
        78,
        Schema::Structure(&[("conference", Schema::Int32)]),
        UCONFERENCE
    ),
    rpc!(
        "accept-async",
        80,
        Schema::Structure(&[("requestList", INT32_ARRAY)]),
        Schema::Empty
    ),
    rpc!("query-async", 81, Schema::Empty, INT32_ARRAY),
    rpc!("user-active", 82, Schema::Empty, Schema::Empty),
    rpc!(
        "who-is-on-dynamic",
        83,
        Schema::Structure(&[
            ("wantVisible", Schema::Bool),
            ("wantInvisible", Schema::Bool),
            ("activeLast", Schema::Int32),
        ]),
        Schema::Array(&DYNAMIC_SESSION_INFO)
    ),
    rpc!("get-collate-table", 85, Schema::Empty, Schema::String),
    rpc!(
        "create-text",
        86,
        Schema::Structure(&[
            ("text", Schema::String),
            ("miscInfo", Schema::Array(&MISC_INFO)),
            ("auxItems", Schema::Array(&AUX_ITEM_INPUT)),
        ]),
        Schema::Int32
    ),
    rpc!(
        "create-anonymous-text",
        87,
        Schema::Structure(&[
            ("text", Schema::String),
            ("miscInfo", Schema::Array(&MISC_INFO)),
            ("auxItems", Schema::Array(&AUX_ITEM_INPUT)),
        ]),
        Schema::Int32
    ),
    rpc!(
        "create-conf",
        88,
        Schema::Structure(&[
            ("name", Schema::String),
            ("type", EXTENDED_CONF_TYPE),
            ("auxItems", Schema::Array(&AUX_ITEM_INPUT)),
        ]),
        Schema::Int32
    ),
    rpc!(
        "create-person",
        89,
        Schema::Structure(&[
            ("name", Schema::String),
            ("passwd", Schema::String),
            ("flags", PERSONAL_FLAGS),
            ("auxItems", Schema::Array(&AUX_ITEM_INPUT)),
        ]),
        Schema::Int32
    ),
];

/// Look up a remote procedure by name.
pub fn rpc(name: &str) -> Option<&'static RpcDescriptor> {
    RPCS.iter().find(|r| r.name == name)
}

/// Look up a remote procedure by wire number.
pub fn rpc_by_number(number: u32) -> Option<&'static RpcDescriptor> {
    RPCS.iter().find(|r| r.number == number)
}

// ── Asynchronous message table ──────────────────────────────────────────

macro_rules! async_msg {
    ($name:literal, $number:literal, $schema:expr) => {
        AsyncDescriptor {
            name: $name,
            number: $number,
            schema: $schema,
        }
    };
}

/// All known asynchronous messages. Messages not listed here (including the
/// Text-Stat carrying `new-text`) are skipped by their argument count, so a
/// newer server never breaks the stream.
pub const ASYNCS: &[AsyncDescriptor] = &[
    async_msg!(
        "new-name",
        5,
        Schema::Structure(&[
            ("confNo", Schema::Int32),
            ("oldName", Schema::String),
            ("newName", Schema::String),
        ])
    ),
    async_msg!("sync-db", 7, Schema::Empty),
    async_msg!(
        "leave-conf",
        8,
        Schema::Structure(&[("confNo", Schema::Int32)])
    ),
    async_msg!(
        "login",
        9,
        Schema::Structure(&[("persNo", Schema::Int32), ("sessionNo", Schema::Int32)])
    ),
    async_msg!("rejected-connection", 11, Schema::Empty),
    async_msg!(
        "send-message",
        12,
        Schema::Structure(&[
            ("recipient", Schema::Int32),
            ("sender", Schema::Int32),
            ("message", Schema::String),
        ])
    ),
    async_msg!(
        "logout",
        13,
        Schema::Structure(&[("persNo", Schema::Int32), ("sessionNo", Schema::Int32)])
    ),
    async_msg!(
        "new-recipient",
        16,
        Schema::Structure(&[
            ("textNo", Schema::Int32),
            ("confNo", Schema::Int32),
            ("type", Schema::Int32),
        ])
    ),
    async_msg!(
        "sub-recipient",
        17,
        Schema::Structure(&[
            ("textNo", Schema::Int32),
            ("confNo", Schema::Int32),
            ("type", Schema::Int32),
        ])
    ),
    async_msg!(
        "new-membership",
        18,
        Schema::Structure(&[("persNo", Schema::Int32), ("confNo", Schema::Int32)])
    ),
    async_msg!(
        "new-user-area",
        19,
        Schema::Structure(&[
            ("persNo", Schema::Int32),
            ("oldUserArea", Schema::Int32),
            ("newUserArea", Schema::Int32),
        ])
    ),
    async_msg!(
        "new-presentation",
        20,
        Schema::Structure(&[
            ("confNo", Schema::Int32),
            ("oldPresentation", Schema::Int32),
            ("newPresentation", Schema::Int32),
        ])
    ),
    async_msg!(
        "new-motd",
        21,
        Schema::Structure(&[
            ("confNo", Schema::Int32),
            ("oldMotd", Schema::Int32),
            ("newMotd", Schema::Int32),
        ])
    ),
    async_msg!(
        "text-aux-changed",
        22,
        Schema::Structure(&[
            ("textNo", Schema::Int32),
            ("deleted", Schema::Array(&AUX_ITEM)),
            ("added", Schema::Array(&AUX_ITEM)),
        ])
    ),
];

/// Look up an asynchronous message by wire number.
pub fn async_message(number: u32) -> Option<&'static AsyncDescriptor> {
    ASYNCS.iter().find(|a| a.number == number)
}

/// Look up an asynchronous message by name.
pub fn async_by_name(name: &str) -> Option<&'static AsyncDescriptor> {
    ASYNCS.iter().find(|a| a.name == name)
}

// ── Error codes ─────────────────────────────────────────────────────────

/// The symbolic name of a protocol error code, if published.
pub fn error_name(code: u32) -> Option<&'static str> {
    Some(match code {
        0 => "no-error",
        2 => "not-implemented",
        3 => "obsolete-call",
        4 => "invalid-password",
        5 => "string-too-long",
        6 => "login-first",
        7 => "login-disallowed",
        8 => "conference-zero",
        9 => "undefined-conference",
        10 => "undefined-person",
        11 => "access-denied",
        12 => "permission-denied",
        13 => "not-member",
        14 => "no-such-text",
        15 => "text-zero",
        16 => "no-such-local-text",
        17 => "local-text-zero",
        18 => "bad-name",
        19 => "index-out-of-range",
        20 => "conference-exists",
        21 => "person-exists",
        22 => "secret-public",
        23 => "letterbox",
        24 => "ldb-error",
        25 => "illegal-misc",
        26 => "illegal-info-type",
        27 => "already-recipient",
        28 => "already-comment",
        29 => "already-footnote",
        30 => "not-recipient",
        31 => "not-comment",
        32 => "not-footnote",
        33 => "recipient-limit",
        34 => "comment-limit",
        35 => "out-of-memory",
        36 => "server-is-crazy",
        37 => "client-is-crazy",
        38 => "undefined-session",
        39 => "regexp-error",
        40 => "not-marked",
        41 => "temporary-failure",
        42 => "long-array",
        43 => "anonymous-rejected",
        44 => "illegal-aux-item",
        45 => "aux-item-permission",
        46 => "unknown-async",
        47 => "internal-error",
        48 => "feature-disabled",
        49 => "message-not-sent",
        50 => "invalid-membership-type",
        51 => "invalid-range",
        52 => "invalid-range-list",
        53 => "undefined-measurement",
        54 => "priority-denied",
        55 => "weight-denied",
        56 => "weight-zero",
        57 => "bad-bool",
        _ => return None,
    })
}

// ── Aux-item tags ───────────────────────────────────────────────────────

/// Well-known aux-item tag numbers.
pub mod aux_tag {
    pub const CONTENT_TYPE: u32 = 1;
    pub const FAST_REPLY: u32 = 2;
    pub const CROSS_REFERENCE: u32 = 3;
    pub const NO_COMMENTS: u32 = 4;
    pub const PERSONAL_COMMENT: u32 = 5;
    pub const REQUEST_CONFIRMATION: u32 = 6;
    pub const READ_CONFIRM: u32 = 7;
    pub const REDIRECT: u32 = 8;
    pub const X_FACE: u32 = 9;
    pub const ALTERNATE_NAME: u32 = 10;
    pub const PGP_SIGNATURE: u32 = 11;
    pub const PGP_PUBLIC_KEY: u32 = 12;
    pub const E_MAIL_ADDRESS: u32 = 13;
    pub const FAQ_TEXT: u32 = 14;
    pub const CREATING_SOFTWARE: u32 = 15;
    pub const MX_AUTHOR: u32 = 16;
    pub const MX_FROM: u32 = 17;
    pub const MX_REPLY_TO: u32 = 18;
    pub const MX_TO: u32 = 19;
    pub const MX_CC: u32 = 20;
    pub const MX_DATE: u32 = 21;
    pub const MX_MESSAGE_ID: u32 = 22;
    pub const MX_IN_REPLY_TO: u32 = 23;
    pub const MX_MISC: u32 = 24;
    pub const MX_ALLOW_FILTER: u32 = 25;
    pub const MX_REJECT_FORWARD: u32 = 26;
    pub const NOTIFY_COMMENTS_TO: u32 = 27;
    pub const FAQ_FOR_CONF: u32 = 28;
    pub const RECOMMENDED_CONF: u32 = 29;
    pub const ALLOWED_CONTENT_TYPE: u32 = 30;
    pub const CANONICAL_NAME: u32 = 31;
    pub const MX_LIST_NAME: u32 = 32;
    pub const SEND_COMMENTS_TO: u32 = 33;
    pub const WORLD_READABLE: u32 = 34;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_lookup() {
        let login = rpc("login").unwrap();
        assert_eq!(login.number, 62);
        assert_eq!(rpc_by_number(62).unwrap().name, "login");
        assert!(rpc("no-such-call").is_none());
    }

    #[test]
    fn test_rpc_numbers_unique() {
        for (i, a) in RPCS.iter().enumerate() {
            for b in &RPCS[i + 1..] {
                assert_ne!(a.number, b.number, "{} and {}", a.name, b.name);
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn test_async_lookup() {
        let msg = async_message(12).unwrap();
        assert_eq!(msg.name, "send-message");
        assert_eq!(async_by_name("send-message").unwrap().number, 12);
        assert!(async_message(15).is_none());
    }

    #[test]
    fn test_error_names() {
        assert_eq!(error_name(0), Some("no-error"));
        assert_eq!(error_name(4), Some("invalid-password"));
        assert_eq!(error_name(57), Some("bad-bool"));
        assert_eq!(error_name(999), None);
    }
}
