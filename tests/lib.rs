#[macro_use(bson, doc)]
extern crate bson;
extern crate byteorder;
extern crate env_logger;
extern crate mongo_driver;

mod client;
