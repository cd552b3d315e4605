pub type Never = std::convert::Infallible;
