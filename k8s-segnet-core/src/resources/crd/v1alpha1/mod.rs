pub mod segmentnetwork;
