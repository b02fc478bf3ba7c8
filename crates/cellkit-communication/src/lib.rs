//! # CellKit Communication
//!
//! Transports and machine drivers for the cell.
//! Supports serial/USB and TCP line transports plus an in-process simulator,
//! the TinyG gantry driver with tool changing, the arm's TCP/JSON bridge and
//! the HTTP servo gripper.

pub mod communication;
pub mod firmware;

pub use communication::{
    communicator_for,
    serial::{list_ports, SerialPortInfo},
    Communicator, CommunicatorFactory, ConnectionDriver, ConnectionParams, DeviceChannel,
    NoOpCommunicator, SerialCommunicator, SimulatedTinyG, SimulatorState, TcpCommunicator,
};

pub use firmware::tinyg::{
    GantryConfig, GantryController, GantryInfo, GantryMachineState, GantryState, MotionHandle,
    StateListener, StatusParser, StatusReport, ToolChangeConfig, ToolChangeStep,
};
pub use firmware::{ArmClient, ArmConfig, GripperClient, GripperConfig, GripperStatus};
