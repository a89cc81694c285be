pub mod scripted_upstream;
