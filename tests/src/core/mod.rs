mod decoder;
mod host;
mod stream;
mod validator;
