use amge::incidence::Incidence;

#[test]
fn push_rows_and_access() {
    let mut incidence = Incidence::new();
    assert!(incidence.is_empty());
    incidence.push_row(&[3, 1]);
    incidence.push_row(&[]);
    incidence.push_row(&[2]);

    assert_eq!(incidence.num_rows(), 3);
    assert_eq!(incidence.row(0), &[3, 1]);
    assert_eq!(incidence.row(1), &[] as &[usize]);
    assert_eq!(incidence.row(2), &[2]);
    assert_eq!(incidence.get(3), None);
}

#[test]
fn transpose_lists_referencing_rows_in_ascending_order() {
    // agglomerate -> entity
    let incidence = Incidence::from(vec![vec![0, 1], vec![1, 2, 3], vec![3, 4]]);
    let transposed = incidence.transpose(6);

    let expected: Vec<Vec<usize>> = vec![vec![0], vec![0, 1], vec![1], vec![1, 2], vec![2], vec![]];
    assert_eq!(transposed.iter().map(<[usize]>::to_vec).collect::<Vec<_>>(), expected);

    // Transposing twice recovers the sorted relation
    assert_eq!(transposed.transpose(3), incidence);
}

#[test]
fn transpose_with_too_few_columns_panics() {
    let incidence = Incidence::from(vec![vec![0, 4]]);
    util::assert_panics!(incidence.transpose(4));
}

#[test]
fn out_of_bounds_row_panics() {
    let incidence = Incidence::from(vec![vec![0]]);
    util::assert_panics!(incidence.row(1));
}
