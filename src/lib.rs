/// Member Registration Service Library
///
/// Core functionality for the phone-number authentication and member
/// registry service: OTP delivery and verification through Twilio Verify,
/// per-number rate limiting, JWT session tokens and DynamoDB-backed
/// member profiles.
///
/// # Modules
/// - `config`: Configuration management
/// - `phone`: Phone number normalization and validation
/// - `twilio`: Verification gateway and OTP rate limiting
/// - `token`: Session token issue and verification
/// - `db`: Member store boundary and implementations
/// - `http`: HTTP surface (routes, handlers, error mapping)
pub mod config;
pub mod db;
pub mod http;
pub mod phone;
pub mod token;
pub mod twilio;
