mod token;

pub use token::{
    generate_secret, random_hex, AuthToken, AuthTokenError, SECRET_BYTES,
};
