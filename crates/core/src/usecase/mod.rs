pub mod rephrase_service;
