//! 共通のHTTP型とユーティリティ

pub mod http;
pub mod utils;

pub use http::{reason_phrase, Method, Request, Response};
pub use utils::{
    decompress_gzip, is_valid_header_name, is_valid_header_value, parse_cookie_header,
    parse_query_string, parse_urlencoded_pairs, percent_decode,
};
