pub mod prefixed_hex_or_bytes_option;
pub mod prefixed_hex_or_bytes_sequence;
pub mod prefixed_hex_or_bytes_vec;
pub mod prefixed_hex_quantity;
pub mod prefixed_hex_quantity_option;

mod shared;
